//! Kubernetes-style resource quantities, reduced to what launch template
//! generation needs: byte counts for volumes and memory, and CPU millis.

use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};
use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;
const TIB: u64 = 1 << 40;

/// A quantity of bytes, parsed from a Kubernetes-style string such as
/// `"200G"`, `"20Gi"`, or `"1048576"`.
///
/// Remote block device APIs take whole gibibytes, so conversion always rounds
/// up; `200G` (decimal) becomes 187 GiB, `4G` becomes 4 GiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ByteQuantity {
    bytes: u64,
}

impl ByteQuantity {
    pub fn from_bytes(bytes: u64) -> Self {
        Self { bytes }
    }

    pub fn from_gib(gib: u64) -> Self {
        Self { bytes: gib * GIB }
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Whole gibibytes, rounded up to the next full unit.
    pub fn gib_ceil(&self) -> u64 {
        self.bytes.div_ceil(GIB)
    }
}

impl FromStr for ByteQuantity {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        ensure!(!input.is_empty(), error::EmptySnafu);

        let split = input
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(input.len());
        let (digits, suffix) = input.split_at(split);
        let value: u64 = digits.parse().ok().context(error::InvalidSnafu { input })?;
        let multiplier = match suffix {
            "" => 1,
            "k" | "K" => 1_000,
            "M" => 1_000_000,
            "G" => 1_000_000_000,
            "T" => 1_000_000_000_000,
            "Ki" => KIB,
            "Mi" => MIB,
            "Gi" => GIB,
            "Ti" => TIB,
            _ => return error::UnknownSuffixSnafu { input, suffix }.fail(),
        };
        let bytes = value
            .checked_mul(multiplier)
            .context(error::OverflowSnafu { input })?;
        Ok(Self { bytes })
    }
}

impl fmt::Display for ByteQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes != 0 && self.bytes % GIB == 0 {
            write!(f, "{}Gi", self.bytes / GIB)
        } else {
            write!(f, "{}", self.bytes)
        }
    }
}

impl TryFrom<String> for ByteQuantity {
    type Error = Error;

    fn try_from(input: String) -> Result<Self> {
        input.parse()
    }
}

impl From<ByteQuantity> for String {
    fn from(q: ByteQuantity) -> String {
        q.to_string()
    }
}

/// Parse a CPU quantity ("2", "500m", "1.5") into millicores.
pub fn parse_cpu_millis(input: &str) -> Result<u64> {
    let input = input.trim();
    ensure!(!input.is_empty(), error::EmptySnafu);

    if let Some(millis) = input.strip_suffix('m') {
        return millis.parse().context(error::InvalidCpuSnafu { input });
    }
    if let Ok(cores) = input.parse::<u64>() {
        return Ok(cores * 1000);
    }
    let cores: f64 = input.parse().ok().context(error::InvalidSnafu { input })?;
    ensure!(
        cores.is_finite() && cores >= 0.0,
        error::InvalidSnafu { input }
    );
    Ok((cores * 1000.0).round() as u64)
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display("Quantity must not be empty"))]
        Empty,

        #[snafu(display("Unable to parse quantity '{}'", input))]
        Invalid { input: String },

        #[snafu(display("Unable to parse CPU quantity '{}': {}", input, source))]
        InvalidCpu {
            input: String,
            source: std::num::ParseIntError,
        },

        #[snafu(display("Quantity '{}' overflows a byte count", input))]
        Overflow { input: String },

        #[snafu(display("Unknown unit suffix '{}' in quantity '{}'", suffix, input))]
        UnknownSuffix { input: String, suffix: String },
    }
}

pub use error::Error;
type Result<T> = std::result::Result<T, error::Error>;

#[cfg(test)]
mod test {
    use super::{parse_cpu_millis, ByteQuantity};

    #[test]
    fn decimal_gigabytes_round_up() {
        // 200 decimal gigabytes is 186.26 GiB and must round to 187
        assert_eq!("200G".parse::<ByteQuantity>().unwrap().gib_ceil(), 187);
        assert_eq!("4G".parse::<ByteQuantity>().unwrap().gib_ceil(), 4);
        assert_eq!("2G".parse::<ByteQuantity>().unwrap().gib_ceil(), 2);
    }

    #[test]
    fn binary_gibibytes_unchanged() {
        assert_eq!("200Gi".parse::<ByteQuantity>().unwrap().gib_ceil(), 200);
        assert_eq!("40Gi".parse::<ByteQuantity>().unwrap().gib_ceil(), 40);
    }

    #[test]
    fn raw_bytes() {
        let one_past = ByteQuantity::from_bytes((1 << 30) + 1);
        assert_eq!(one_past.gib_ceil(), 2);
        assert_eq!(ByteQuantity::from_bytes(1 << 30).gib_ceil(), 1);
    }

    #[test]
    fn gib_ceil_near_the_top_of_the_range() {
        assert_eq!(ByteQuantity::from_bytes(u64::MAX).gib_ceil(), 1 << 34);
        assert_eq!(ByteQuantity::from_bytes(u64::MAX - (1 << 30) + 1).gib_ceil(), (1 << 34) - 1);
    }

    #[test]
    fn bad_quantities() {
        for bad in &["", "Gi", "20Q", "-5G", "20GiB"] {
            bad.parse::<ByteQuantity>().unwrap_err();
        }
    }

    #[test]
    fn cpu_millis() {
        assert_eq!(parse_cpu_millis("500m").unwrap(), 500);
        assert_eq!(parse_cpu_millis("2").unwrap(), 2000);
        assert_eq!(parse_cpu_millis("1.5").unwrap(), 1500);
        parse_cpu_millis("lots").unwrap_err();
    }
}
