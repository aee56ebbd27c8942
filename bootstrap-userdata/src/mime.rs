//! Multi-part user data archives.
//!
//! Instances accept one opaque user data blob, but we routinely need to ship
//! a user-supplied document alongside our generated bootstrap sections.  The
//! multipart/mixed envelope is the container: this module parses whatever the
//! user gave us into typed parts, and re-emits a well-formed archive with the
//! user's parts first (unmodified, original order) and ours appended.
//!
//! Input auto-detection covers three shapes: a well-formed multipart archive,
//! a single-part document, and an archive whose `Content-Type` header appears
//! before `MIME-Version` (header order is not significant).

use snafu::{ensure, OptionExt};

/// Boundary used for the archives we emit.  Parsing accepts any declared
/// boundary.
const BOUNDARY: &str = "//";

pub const SHELL_SCRIPT: &str = "text/x-shellscript; charset=\"us-ascii\"";
pub const NODE_CONFIG: &str = "application/node.eks.aws";

/// One typed section of a user data archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub content_type: String,
    pub content: String,
}

impl Part {
    pub fn new<T, C>(content_type: T, content: C) -> Self
    where
        T: Into<String>,
        C: Into<String>,
    {
        Self {
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// Parse user data into parts.  Single-part input that carries no MIME
/// headers is typed with `fallback_type`.
pub fn parse(input: &str, fallback_type: &str) -> Result<Vec<Part>> {
    let (headers, body) = split_headers(input);

    let content_type = headers
        .iter()
        .find_map(|line| header_value(line, "content-type"));

    match content_type {
        Some(value) if value.to_ascii_lowercase().contains("multipart/mixed") => {
            let boundary = boundary_param(&value).context(error::MissingBoundarySnafu)?;
            parse_multipart(body, &boundary)
        }
        // A lone part that declared its own type.
        Some(value) => Ok(vec![Part::new(value, body.to_string())]),
        // No MIME headers at all; the whole input is one part.
        None => Ok(vec![Part::new(fallback_type, input.to_string())]),
    }
}

/// Emit a multipart archive containing the given parts in order.
pub fn emit(parts: &[Part]) -> String {
    let mut out = String::new();
    out.push_str("MIME-Version: 1.0\n");
    out.push_str(&format!(
        "Content-Type: multipart/mixed; boundary=\"{}\"\n\n",
        BOUNDARY
    ));
    for part in parts {
        out.push_str(&format!("--{}\n", BOUNDARY));
        out.push_str(&format!("Content-Type: {}\n\n", part.content_type));
        out.push_str(&part.content);
        // Exactly one newline between content and the next boundary; the
        // parser strips exactly one, so content round-trips byte-for-byte.
        out.push('\n');
    }
    out.push_str(&format!("--{}--\n", BOUNDARY));
    out
}

/// Merge generated parts into optional user data: user parts keep their
/// original order, generated parts follow.  Merging already-merged output a
/// second time will duplicate parts; callers are expected to merge once per
/// render.
pub fn merge(user_data: Option<&str>, fallback_type: &str, generated: Vec<Part>) -> Result<String> {
    let mut parts = match user_data {
        Some(data) if !data.trim().is_empty() => parse(data, fallback_type)?,
        _ => Vec::new(),
    };
    parts.extend(generated);
    Ok(emit(&parts))
}

/// Split a leading RFC 822 style header block from the body.  Returns no
/// headers unless the block actually contains a MIME header we recognize,
/// so YAML documents (`apiVersion: ...`) are not mistaken for one.
fn split_headers(input: &str) -> (Vec<String>, &str) {
    let mut headers = Vec::new();
    let mut offset = 0;
    for line in input.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            offset += line.len();
            break;
        }
        if !looks_like_header(trimmed) {
            return (Vec::new(), input);
        }
        headers.push(trimmed.to_string());
        offset += line.len();
    }

    let recognized = headers.iter().any(|line| {
        header_value(line, "mime-version").is_some() || header_value(line, "content-type").is_some()
    });
    if recognized {
        (headers, &input[offset..])
    } else {
        (Vec::new(), input)
    }
}

fn looks_like_header(line: &str) -> bool {
    match line.split_once(':') {
        Some((name, _)) => {
            !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        None => false,
    }
}

/// Case-insensitive header lookup; returns the value when `line` is the
/// named header.
fn header_value(line: &str, name: &str) -> Option<String> {
    let (key, value) = line.split_once(':')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value.trim().to_string())
    } else {
        None
    }
}

/// Extract the boundary parameter from a multipart content type value,
/// tolerating optional quotes.
fn boundary_param(content_type: &str) -> Option<String> {
    for param in content_type.split(';') {
        let param = param.trim();
        if let Some(value) = param.strip_prefix("boundary=") {
            let value = value.trim_matches('"');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn parse_multipart(body: &str, boundary: &str) -> Result<Vec<Part>> {
    let delimiter = format!("--{}", boundary);
    let terminator = format!("--{}--", boundary);

    let mut parts = Vec::new();
    let mut current: Option<PartBuilder> = None;

    // Line endings are kept with their lines so part content survives
    // unmodified, blank lines included.
    for line in body.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == terminator {
            if let Some(builder) = current.take() {
                parts.push(builder.build());
            }
            break;
        }
        if trimmed == delimiter {
            if let Some(builder) = current.take() {
                parts.push(builder.build());
            }
            current = Some(PartBuilder::new());
            continue;
        }
        if let Some(builder) = current.as_mut() {
            builder.line(line);
        }
        // Anything before the first delimiter is preamble; ignored.
    }

    ensure!(!parts.is_empty(), error::NoPartsSnafu);
    Ok(parts)
}

struct PartBuilder {
    content_type: Option<String>,
    in_headers: bool,
    lines: Vec<String>,
}

impl PartBuilder {
    fn new() -> Self {
        Self {
            content_type: None,
            in_headers: true,
            lines: Vec::new(),
        }
    }

    fn line(&mut self, line: &str) {
        if self.in_headers {
            let trimmed = line.trim_end();
            if trimmed.is_empty() {
                self.in_headers = false;
                return;
            }
            if looks_like_header(trimmed) {
                if let Some(value) = header_value(trimmed, "content-type") {
                    self.content_type = Some(value);
                }
                // Other part headers (transfer encoding et al.) are dropped;
                // content is carried verbatim.
                return;
            }
            // Content that starts without a blank line after the delimiter.
            self.in_headers = false;
        }
        self.lines.push(line.to_string());
    }

    fn build(self) -> Part {
        let mut content = self.lines.concat();
        // Drop only the newline the emitter put between content and the
        // boundary; anything else, trailing blank lines included, belongs to
        // the part.
        if content.ends_with('\n') {
            content.pop();
        }
        Part {
            content_type: self
                .content_type
                .unwrap_or_else(|| "text/plain".to_string()),
            content,
        }
    }
}

mod error {
    use snafu::Snafu;

    #[derive(Debug, Snafu)]
    #[snafu(visibility(pub(super)))]
    pub enum Error {
        #[snafu(display(
            "User data declares a multipart archive but its content type has no boundary"
        ))]
        MissingBoundary,

        #[snafu(display("User data declares a multipart archive but contains no parts"))]
        NoParts,
    }
}

pub use error::Error;
type Result<T> = std::result::Result<T, error::Error>;
