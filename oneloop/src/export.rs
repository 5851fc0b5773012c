//! Textual export for downstream analytic tooling.
//!
//! Every statement has the form `symbol = term + term + ... ;` followed by
//! a newline, with `0` standing in for an empty sum. A term renders as
//! `(wick)*(time)*(measure)*(integrand)`.

use std::fmt::{self, Write};

/// Writes one export statement.
///
/// # Errors
///
/// Propagates errors of the underlying writer.
///
/// # Example
///
/// ```
/// use lss_oneloop::export::write_statement;
///
/// let mut out = String::new();
/// write_statement(&mut out, "PTree", ["(1)*(1)*(1)*(Pk(k))".to_string()]).unwrap();
/// write_statement(&mut out, "P13", Vec::new()).unwrap();
/// assert_eq!(out, "PTree = (1)*(1)*(1)*(Pk(k));\nP13 = 0;\n");
/// ```
pub fn write_statement<W, I>(out: &mut W, symbol: &str, terms: I) -> fmt::Result
where
    W: Write,
    I: IntoIterator<Item = String>,
{
    write!(out, "{symbol} = ")?;
    let mut written = 0usize;
    for term in terms {
        if written > 0 {
            out.write_str(" + ")?;
        }
        out.write_str(&term)?;
        written += 1;
    }
    if written == 0 {
        out.write_str("0")?;
    }
    out.write_str(";\n")
}

/// Objects that render as a block of export statements.
pub trait Export {
    /// Writes every statement of this object.
    ///
    /// # Errors
    ///
    /// Propagates errors of the underlying writer.
    fn write_export<W: Write>(&self, out: &mut W) -> fmt::Result;

    /// The export block as a string.
    ///
    /// # Errors
    ///
    /// Returns [`fmt::Error`] if rendering a term fails; a partial block is
    /// never returned.
    fn export(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        self.write_export(&mut out)?;
        Ok(out)
    }
}
