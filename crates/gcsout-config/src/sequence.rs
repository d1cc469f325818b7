// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Rendering of `sequence_format` strings.
//!
//! A sequence format is a small printf dialect used to build object keys
//! from the task index and the file index. Supported conversions:
//!
//! - `%d`, `%5d`, `%05d`, `%-5d`: decimal integer with optional width
//! - `%1$d`, `%2$03d`: explicit argument position (1-based)
//! - `%%`: a literal percent sign
//!
//! ```
//! use gcsout_config::sequence::render;
//!
//! assert_eq!(render(".%03d.%02d", &[1, 2]).unwrap(), ".001.02");
//! ```

use crate::error::{ConfigError, ConfigResult};

/// Widest field a conversion may ask for
pub const MAX_WIDTH: usize = 64;

/// Render `format` with the given integer arguments
pub fn render(format: &str, args: &[usize]) -> ConfigResult<String> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut digits = String::new();
        let mut position = None;
        let mut left_align = false;
        let mut zero_pad = false;

        loop {
            match chars.peek() {
                Some('-') if digits.is_empty() => {
                    left_align = true;
                    chars.next();
                }
                Some('0') if digits.is_empty() => {
                    zero_pad = true;
                    chars.next();
                }
                Some(d) if d.is_ascii_digit() => {
                    digits.push(*d);
                    chars.next();
                }
                Some('$') if position.is_none() && !digits.is_empty() => {
                    position = Some(parse_number(format, &digits)?);
                    digits.clear();
                    chars.next();
                }
                _ => break,
            }
        }

        match chars.next() {
            Some('d') => {}
            Some(other) => {
                return Err(invalid(format, format!("unsupported conversion '%{}'", other)));
            }
            None => return Err(invalid(format, "dangling '%' at end of format")),
        }

        let index = match position {
            Some(0) => return Err(invalid(format, "argument positions start at 1")),
            Some(p) => p - 1,
            None => {
                next_arg += 1;
                next_arg - 1
            }
        };

        let value = args.get(index).ok_or_else(|| {
            invalid(
                format,
                format!("refers to argument {} but only {} are available", index + 1, args.len()),
            )
        })?;

        let width = if digits.is_empty() {
            0
        } else {
            parse_number(format, &digits)?
        };
        if width > MAX_WIDTH {
            return Err(invalid(
                format,
                format!("field width {} exceeds the maximum of {}", width, MAX_WIDTH),
            ));
        }

        let rendered = if left_align {
            format!("{:<width$}", value, width = width)
        } else if zero_pad {
            format!("{:0width$}", value, width = width)
        } else {
            format!("{:>width$}", value, width = width)
        };
        out.push_str(&rendered);
    }

    Ok(out)
}

fn parse_number(format: &str, digits: &str) -> ConfigResult<usize> {
    digits
        .parse()
        .map_err(|_| invalid(format, format!("'{}' is not a valid number", digits)))
}

fn invalid(format: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::invalid_value(
        "output.sequence_format",
        format!("'{}' {}", format, reason.into()),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format() {
        assert_eq!(render(".%03d.%02d", &[0, 0]).unwrap(), ".000.00");
        assert_eq!(render(".%03d.%02d", &[12, 3]).unwrap(), ".012.03");
        assert_eq!(render(".%03d.%02d", &[1234, 3]).unwrap(), ".1234.03");
    }

    #[test]
    fn test_widths_and_alignment() {
        assert_eq!(render("[%4d]", &[7]).unwrap(), "[   7]");
        assert_eq!(render("[%-4d]", &[7]).unwrap(), "[7   ]");
        assert_eq!(render("%d", &[42]).unwrap(), "42");
    }

    #[test]
    fn test_positional_arguments() {
        assert_eq!(render("%2$d-%1$03d", &[5, 9]).unwrap(), "9-005");
    }

    #[test]
    fn test_literal_percent() {
        assert_eq!(render("100%%-%d", &[1]).unwrap(), "100%-1");
    }

    #[test]
    fn test_no_conversions() {
        assert_eq!(render("static", &[1, 2]).unwrap(), "static");
    }

    #[test]
    fn test_errors() {
        assert!(render("%s", &[1]).is_err());
        assert!(render("%d%d%d", &[1, 2]).is_err());
        assert!(render("trailing %", &[1]).is_err());
        assert!(render("%0$d", &[1]).is_err());
    }

    #[test]
    fn test_width_is_capped() {
        assert_eq!(render("%064d", &[1]).unwrap().len(), MAX_WIDTH);
        assert!(render("%65d", &[1]).is_err());
        assert!(matches!(
            render("%999999999999d", &[1]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
