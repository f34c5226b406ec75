use semver::{Version, VersionReq};
use std::fmt::{Display, Formatter};
use thiserror::Error;

const OPERATOR_CHARS: &[char] = &['=', '^', '~', '>', '<'];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("chart version constraint can't be empty")]
    Empty,

    #[error("invalid chart version constraint `{constraint}`: {msg}")]
    Invalid { constraint: String, msg: String },
}

/// Chart version constraint as written by operators in release declarations.
///
/// Follows the range syntax used by chart repositories tooling (npm flavour):
/// a bare partial version is an x-range, so `6.7` stands for `>=6.7.0 <6.8.0`
/// and `1.2.3` for exactly `1.2.3`. `||` separates alternatives, spaces separate
/// comparators, `a - b` is an inclusive hyphen range.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartVersionConstraint {
    raw: String,
    alternatives: Vec<VersionReq>,
    exact_version: Option<Version>,
}

impl ChartVersionConstraint {
    pub fn parse(raw: &str) -> Result<ChartVersionConstraint, ConstraintError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConstraintError::Empty);
        }

        let mut alternatives = Vec::new();
        for alternative in raw.split("||") {
            let req = to_version_req(alternative.trim()).map_err(|msg| ConstraintError::Invalid {
                constraint: raw.to_string(),
                msg,
            })?;
            alternatives.push(req);
        }

        Ok(ChartVersionConstraint {
            raw: raw.to_string(),
            alternatives,
            exact_version: Version::parse(strip_v_prefix(raw)).ok(),
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// True only when the constraint is a full version carrying a prerelease tag (`1.0.0-rc.1`).
    pub fn is_prerelease(&self) -> bool {
        self.exact_version
            .as_ref()
            .map(|version| !version.pre.is_empty())
            .unwrap_or(false)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Display for ChartVersionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn strip_v_prefix(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}

fn to_version_req(alternative: &str) -> Result<VersionReq, String> {
    let mut comparators: Vec<String> = Vec::new();

    if let Some((lower, upper)) = alternative.split_once(" - ") {
        if let Some(lower) = normalize_version(lower.trim())? {
            comparators.push(format!(">={lower}"));
        }
        if let Some(upper) = normalize_version(upper.trim())? {
            comparators.push(format!("<={upper}"));
        }
    } else {
        // `>= 1.2` is allowed, the lonely operator sticks to the next token
        let mut tokens = Vec::new();
        let mut pending_operator = String::new();
        for token in alternative.split_whitespace() {
            if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
                pending_operator.push_str(token);
                continue;
            }
            tokens.push(format!("{pending_operator}{token}"));
            pending_operator.clear();
        }
        if !pending_operator.is_empty() {
            return Err(format!("operator `{pending_operator}` is not followed by a version"));
        }

        for token in tokens {
            if let Some(comparator) = to_comparator(&token)? {
                comparators.push(comparator);
            }
        }
    }

    if comparators.is_empty() {
        return Ok(VersionReq::STAR);
    }

    VersionReq::parse(&comparators.join(", ")).map_err(|e| e.to_string())
}

fn to_comparator(token: &str) -> Result<Option<String>, String> {
    let split_at = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(token.len());
    let (operator, version) = token.split_at(split_at);

    let operator = match operator {
        // bare versions are x-ranges, which is what `=` means for partial versions in semver
        "" | "=" => "=",
        "~>" => "~",
        "^" | "~" | ">" | ">=" | "<" | "<=" => operator,
        _ => return Err(format!("unknown operator `{operator}`")),
    };

    match normalize_version(version)? {
        Some(version) => Ok(Some(format!("{operator}{version}"))),
        None if operator == "<" => Err("nothing is lower than `*`".to_string()),
        None => Ok(None),
    }
}

/// Strips `v` prefix, build metadata and wildcard parts (`1.2.x` -> `1.2`).
/// `None` means the version is a pure wildcard.
fn normalize_version(version: &str) -> Result<Option<String>, String> {
    let version = strip_v_prefix(version);
    if version.is_empty() {
        return Err("missing version".to_string());
    }

    let without_build = version.split('+').next().unwrap_or(version);
    let (core, prerelease) = match without_build.split_once('-') {
        Some((core, prerelease)) => (core, Some(prerelease)),
        None => (without_build, None),
    };

    let raw_parts = core.split('.').collect::<Vec<&str>>();
    if raw_parts.len() > 3 {
        return Err(format!("`{version}` has too many components"));
    }

    let mut parts = Vec::with_capacity(3);
    for part in raw_parts {
        if matches!(part, "x" | "X" | "*") {
            break;
        }
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("`{version}` is not a version"));
        }
        parts.push(part);
    }

    match (parts.len(), prerelease) {
        (0, None) => Ok(None),
        (3, Some(prerelease)) => Ok(Some(format!("{}-{}", parts.join("."), prerelease))),
        (_, Some(_)) => Err(format!("`{version}` carries a prerelease tag on a partial version")),
        (_, None) => Ok(Some(parts.join("."))),
    }
}
