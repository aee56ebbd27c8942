//! Deep merge of TOML settings documents, used when the structured-config
//! family combines generated settings with user-supplied user data.
//!
//! Scalars and arrays on the right replace the left; tables merge
//! recursively, so user-only sections survive untouched while generated
//! values win on conflict.  Mismatched data types mean the user document
//! disagrees with the settings model, and we refuse to guess.

use snafu::ensure;
use toml::{map::Entry, Value};

pub fn merge_values<'a>(merge_into: &'a mut Value, merge_from: &'a Value) -> Result<()> {
    ensure!(
        merge_into.same_type(merge_from),
        error::DataTypeMismatchSnafu
    );

    match merge_from {
        // Scalars replace wholesale; arrays are treated like scalars so
        // there is no ambiguity about appending versus replacing.
        Value::String(_)
        | Value::Integer(_)
        | Value::Float(_)
        | Value::Boolean(_)
        | Value::Datetime(_)
        | Value::Array(_) => *merge_into = merge_from.clone(),

        Value::Table(t2) => {
            // The ensure above guarantees the left side is also a table.
            let t1 = merge_into.as_table_mut().unwrap();
            for (k2, v2) in t2.iter() {
                match t1.entry(k2) {
                    Entry::Vacant(e) => {
                        e.insert(v2.clone());
                    }
                    Entry::Occupied(ref mut e) => {
                        merge_values(e.get_mut(), v2)?;
                    }
                }
            }
        }
    }

    Ok(())
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Cannot merge mismatched data types in given TOML"))]
        DataTypeMismatch {},
    }
}

pub use error::Error;
type Result<T> = std::result::Result<T, error::Error>;
