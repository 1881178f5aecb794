//! Formatting utilities.

use std::fmt::*;

/// See [`fmt_with()`].
#[derive(Clone, Copy)]
pub struct FmtWith<F = fn(&mut Formatter) -> Result> {
    fmt: F,
}

/// Formats via a closure, so that a value can be rendered lazily into a `Display` position
/// without first collecting it into a `String`.
pub fn fmt_with<F: Fn(&mut Formatter) -> Result>(fmt: F) -> FmtWith<F> {
    FmtWith { fmt }
}

impl<F: Fn(&mut Formatter) -> Result> Debug for FmtWith<F> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        (self.fmt)(f)
    }
}

impl<F: Fn(&mut Formatter) -> Result> Display for FmtWith<F> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        (self.fmt)(f)
    }
}

/// Write `items` separated by `", "`, each rendered by `each`.
pub(crate) fn comma_separated<T, F>(f: &mut Formatter, items: &[T], each: F) -> Result
where
    F: Fn(&mut Formatter, &T) -> Result,
{
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        each(f, item)?;
    }
    Ok(())
}
