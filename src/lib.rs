//! Renders the weak-scalability chart of the sequential refinement
//! experiment — elapsed time against mesh refinement level — and saves
//! it as a PDF through [Matplotlib][].
//!
//! The binding layer talks to Python via `pyo3` and hands sample data
//! over without copying via `numpy`.
//!
//! [Matplotlib]: https://matplotlib.org/

use std::{
    fmt::{Display, Formatter},
    path::Path,
};
use lazy_static::lazy_static;
use log::info;
use pyo3::{
    prelude::*,
    intern,
    exceptions::{PyFileNotFoundError, PyPermissionError},
    types::PyDict,
};

macro_rules! getattr {
    ($py: ident, $lib: expr, $f: literal) => {
        $lib.getattr($py, intern!($py, $f)).unwrap()
    };
}

/// Call the Python method `$m` on `$obj`, taking the GIL for the
/// duration of the call.
macro_rules! meth {
    ($obj: expr, $m: ident, $py: ident -> $args: expr, $kwargs: expr) => {
        Python::with_gil(|py| {
            let $py = py;
            $obj.call_method(py, intern!(py, stringify!($m)), $args, $kwargs)
        })
    };
    ($obj: expr, $m: ident, $args: expr) => {
        Python::with_gil(|py| {
            $obj.call_method1(py, intern!(py, stringify!($m)), $args)
        })
    };
}

/// Possible failures while rendering the chart.
#[derive(Debug)]
pub enum Error {
    /// The Python library "matplotlib" was not found.
    NoMatplotlib,
    /// The output path contains an element that is not a directory or
    /// does not exist.
    FileNotFoundError,
    /// Permission denied to create the output file.
    PermissionError,
    /// Other Python errors.
    Python(PyErr),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::NoMatplotlib =>
                write!(f, "The matplotlib library has not been found.\n\
                           Please install it.  See https://matplotlib.org/"),
            Error::FileNotFoundError =>
                write!(f, "The output path contains an element that is \
                           not a directory or does not exist"),
            Error::PermissionError =>
                write!(f, "Permission denied to create the output file"),
            Error::Python(e) =>
                write!(f, "Python error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

/// Import and return a handle to the module `$m`.
macro_rules! pyimport { ($m: literal) => {
    Python::with_gil(|py|
        PyModule::import(py, intern!(py, $m)).map(|m| m.into()))
}}

lazy_static! {
    // matplotlib.figure is imported directly, bypassing pyplot, so no
    // GUI backend is ever spun up for a file-only render.
    static ref FIGURE: Result<Py<PyModule>, PyErr> = {
        pyimport!("matplotlib.figure")
    };
    static ref NUMPY: Result<Numpy, PyErr> = {
        Ok(Numpy {
            numpy: pyimport!("numpy.ctypeslib")?,
            ctypes: pyimport!("ctypes")?,
        })
    };
}

/// Return a handle to the module `$m`.
/// ⚠ This may try to lock Python's GIL.  Make sure it is executed
/// outside a call to `Python::with_gil`.
macro_rules! pymod { ($m: ident) => {
    $m.as_ref().map_err(|_| Error::NoMatplotlib)
}}

/// A "connection" to the `numpy` module used to expose Rust slices to
/// Python without copying them.
#[derive(Clone)]
struct Numpy {
    numpy: Py<PyModule>,
    ctypes: Py<PyModule>,
}

impl Numpy {
    /// Wrap `x` as a numpy ndarray viewing the slice's memory.  The
    /// slice must stay alive for as long as the returned array is used.
    fn as_array(&self, py: Python, x: &[f64]) -> PyObject {
        // ctypes.POINTER(ctypes.c_double)
        let ty = getattr!(py, self.ctypes, "POINTER")
            .call1(py, (getattr!(py, self.ctypes, "c_double"),)).unwrap();
        // ctypes.cast(x.as_ptr(), ty)
        let ptr = getattr!(py, self.ctypes, "cast")
            .call1(py, (x.as_ptr() as usize, ty)).unwrap();
        // numpy.ctypeslib.as_array(ptr, shape=(x.len(),))
        getattr!(py, self.numpy, "as_array")
            .call1(py, (ptr, (x.len(),))).unwrap()
    }
}

/// The top level container for the chart.
#[derive(Debug)]
pub struct Figure {
    fig: PyObject, // instance of matplotlib.figure.Figure
}

/// The single plot area of a [`Figure`].
#[derive(Debug)]
pub struct Axes {
    ax: PyObject,
}

/// Return a new figure together with its single axes.
pub fn figure() -> Result<(Figure, Axes), Error> {
    let figure = pymod!(FIGURE)?;
    Python::with_gil(|py| {
        let fig = getattr!(py, figure, "Figure")
            .call0(py).map_err(Error::Python)?;
        let ax = fig.call_method0(py, intern!(py, "add_subplot"))
            .map_err(Error::Python)?;
        Ok((Figure { fig }, Axes { ax }))
    })
}

impl Figure {
    /// Write the figure to `path`, overwriting any file already there.
    /// The rendered format follows the path's extension.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        Python::with_gil(|py| {
            self.fig.call_method1(
                py, intern!(py, "savefig"), (path.as_ref(),)
            ).map_err(|e| {
                if e.is_instance_of::<PyFileNotFoundError>(py) {
                    Error::FileNotFoundError
                } else if e.is_instance_of::<PyPermissionError>(py) {
                    Error::PermissionError
                } else {
                    Error::Python(e)
                }
            })
        })?;
        Ok(())
    }
}

impl Axes {
    /// Draw `samples` as a line through (x, y) pairs.  Styling is
    /// chosen on the returned [`LinePlot`] before calling
    /// [`LinePlot::plot`].
    #[must_use]
    pub fn line<'a>(&'a mut self, samples: &'a [(f64, f64)]) -> LinePlot<'a> {
        LinePlot { axes: self,
                   samples,
                   linestyle: None,
                   marker: None,
                   color: None }
    }

    pub fn set_title(&mut self, v: &str) -> &mut Self {
        meth!(self.ax, set_title, (v,)).unwrap();
        self
    }

    /// Like [`Axes::set_title`] with a bold font weight.
    pub fn set_bold_title(&mut self, v: &str) -> &mut Self {
        meth!(self.ax, set_title, py -> (v,), {
            let kwargs = PyDict::new(py);
            kwargs.set_item("fontweight", "bold").unwrap();
            Some(kwargs)
        }).unwrap();
        self
    }

    pub fn set_xlabel(&mut self, label: &str) -> &mut Self {
        meth!(self.ax, set_xlabel, (label,)).unwrap();
        self
    }

    pub fn set_ylabel(&mut self, label: &str) -> &mut Self {
        meth!(self.ax, set_ylabel, (label,)).unwrap();
        self
    }

    /// Fix the y axis to the range [`lo`, `hi`] instead of letting
    /// Matplotlib fit it to the data.
    pub fn set_ylim(&mut self, lo: f64, hi: f64) -> &mut Self {
        meth!(self.ax, set_ylim, (lo, hi)).unwrap();
        self
    }

    pub fn grid(&mut self) -> &mut Self {
        meth!(self.ax, grid, (true,)).unwrap();
        self
    }
}

/// A line plot in the making: data plus styling, drawn by
/// [`LinePlot::plot`].
#[must_use]
pub struct LinePlot<'a> {
    axes: &'a Axes,
    samples: &'a [(f64, f64)],
    linestyle: Option<&'a str>,
    marker: Option<&'a str>,
    color: Option<&'a str>,
}

impl<'a> LinePlot<'a> {
    /// Matplotlib line style, e.g. "-", "--", ":".
    pub fn linestyle(mut self, v: &'a str) -> Self {
        self.linestyle = Some(v);
        self
    }

    /// Matplotlib marker symbol, e.g. "*", "o", ".".
    pub fn marker(mut self, v: &'a str) -> Self {
        self.marker = Some(v);
        self
    }

    /// Line color as a Matplotlib color spec, e.g. "#ff6c4d".  A hex
    /// color cannot be expressed in a format string, hence a kwarg.
    pub fn color(mut self, v: &'a str) -> Self {
        self.color = Some(v);
        self
    }

    /// Draw the line on the axes with the selected styling.
    pub fn plot(self) -> Result<(), Error> {
        let numpy = pymod!(NUMPY)?;
        let (x, y): (Vec<f64>, Vec<f64>) =
            self.samples.iter().copied().unzip();
        Python::with_gil(|py| {
            let kwargs = PyDict::new(py);
            if let Some(ls) = self.linestyle {
                kwargs.set_item("linestyle", ls).unwrap()
            }
            if let Some(m) = self.marker {
                kwargs.set_item("marker", m).unwrap()
            }
            if let Some(c) = self.color {
                kwargs.set_item("color", c).unwrap()
            }
            // `x` and `y` live to the end of the call to "plot".
            let xn = numpy.as_array(py, &x);
            let yn = numpy.as_array(py, &y);
            self.axes.ax.call_method(
                py, intern!(py, "plot"), (xn, yn), Some(kwargs)
            ).map_err(Error::Python)
        })?;
        Ok(())
    }
}

/// Timings of the sequential runs, as (refinement level, elapsed
/// seconds) pairs.  Refinement levels are integers but are plotted on
/// a continuous axis.
pub const SEQUENTIAL_RUNS: [(f64, f64); 3] =
    [(1., 1.94), (3., 4.92), (6., 45.5)];

/// Fixed range of the time axis, in seconds.
pub const TIME_AXIS_RANGE: (f64, f64) = (0., 50.);

/// Render the weak-scalability chart of [`SEQUENTIAL_RUNS`] and write
/// it to `path`.
pub fn render_weak_scaling(path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    let (fig, mut ax) = figure()?;
    ax.line(&SEQUENTIAL_RUNS)
        .linestyle("--")
        .marker("*")
        .color("#ff6c4d")
        .plot()?;
    ax.set_bold_title("Sequential result for different refinement values")
        .set_xlabel("Refine")
        .set_ylabel("Time (in s)")
        .set_ylim(TIME_AXIS_RANGE.0, TIME_AXIS_RANGE.1)
        .grid();
    fig.save_to(path)?;
    info!("wrote {}", path.display());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_runs_pair_levels_with_times() {
        assert_eq!(SEQUENTIAL_RUNS.len(), 3);
        assert_eq!(SEQUENTIAL_RUNS[0], (1., 1.94));
        assert_eq!(SEQUENTIAL_RUNS[1], (3., 4.92));
        assert_eq!(SEQUENTIAL_RUNS[2], (6., 45.5));
    }

    #[test]
    fn times_fit_the_fixed_axis_range() {
        let (lo, hi) = TIME_AXIS_RANGE;
        assert!(lo < hi);
        for (_, t) in SEQUENTIAL_RUNS {
            assert!(lo <= t && t <= hi);
        }
    }

    #[test]
    fn renders_nonempty_pdf() -> Result<(), Error> {
        let path = "target/weak_scaling.pdf";
        render_weak_scaling(path)?;
        let size = std::fs::metadata(path).unwrap().len();
        assert!(size > 0);
        Ok(())
    }

    #[test]
    fn rerender_overwrites_in_place() -> Result<(), Error> {
        let path = "target/weak_scaling_again.pdf";
        render_weak_scaling(path)?;
        render_weak_scaling(path)?;
        Ok(())
    }

    #[test]
    fn missing_directory_is_reported() {
        let r = render_weak_scaling("target/no_such_dir/out.pdf");
        assert!(matches!(r, Err(Error::FileNotFoundError)));
    }
}
