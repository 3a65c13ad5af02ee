//! Statement placeholder rewriting.
//!
//! Callers write statements with `?` positional or `:name` named
//! placeholders regardless of driver. mysql and sqlite consume `?`
//! natively; postgres needs `$1`-style numbering. This module rewrites the
//! statement into the driver's syntax and reports which bind key feeds each
//! placeholder, in placeholder order.

use crate::bind::BindKey;
use crate::config::DbDriver;

/// Rewrite placeholders for `driver` and collect the bind keys in the order
/// the rewritten statement expects them.
///
/// Text inside single quotes, double quotes, or backticks is copied
/// verbatim, and a postgres `::type` cast is not a named placeholder.
pub fn rewrite_placeholders(sql: &str, driver: DbDriver) -> (String, Vec<BindKey>) {
    let mut out = String::with_capacity(sql.len());
    let mut keys = Vec::new();
    let mut position = 0usize;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                for quoted in chars.by_ref() {
                    out.push(quoted);
                    if quoted == c {
                        break;
                    }
                }
            }
            '?' => {
                position += 1;
                keys.push(BindKey::Position(position));
                push_placeholder(&mut out, driver, keys.len());
            }
            ':' => {
                if chars.peek() == Some(&':') {
                    // postgres cast, not a placeholder
                    out.push_str("::");
                    chars.next();
                } else if chars
                    .peek()
                    .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_')
                {
                    let mut name = String::new();
                    while let Some(&next) = chars.peek() {
                        if next.is_ascii_alphanumeric() || next == '_' {
                            name.push(next);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    keys.push(BindKey::Name(name));
                    push_placeholder(&mut out, driver, keys.len());
                } else {
                    out.push(':');
                }
            }
            _ => out.push(c),
        }
    }

    (out, keys)
}

fn push_placeholder(out: &mut String, driver: DbDriver, index: usize) {
    match driver {
        DbDriver::Postgres => {
            out.push('$');
            out.push_str(&index.to_string());
        }
        DbDriver::Mysql | DbDriver::Sqlite => out.push('?'),
    }
}
