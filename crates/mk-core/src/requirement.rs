//! Requirement grammar: `name` or `name OP version`.

use std::fmt;

use crate::version::Version;

/// A comparison operator accepted in a requirement string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    fn satisfied(self, declared: &Version, required: &Version) -> bool {
        match self {
            Op::Eq => declared == required,
            Op::Gt => declared > required,
            Op::Ge => declared >= required,
            Op::Lt => declared < required,
            Op::Le => declared <= required,
        }
    }
}

/// A parsed requirement, e.g. `core>=2.0.0` or a bare `core`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// The required plugin's name.
    pub name: String,
    /// The version constraint, absent for a bare name requirement.
    pub constraint: Option<(Op, Version)>,
    raw: String,
}

impl Requirement {
    /// Parses a requirement string per the grammar in the manifest schema:
    /// `identifier ( ( '==' | '>=' | '>' | '<=' | '<' | '=' ) version )?`.
    ///
    /// Returns `None` if the string does not match the grammar at all.
    /// Operators are checked longest-first so `>=` is not mistaken for `>`.
    pub fn parse(s: &str) -> Option<Self> {
        const OPERATORS: &[(&str, Op)] = &[
            ("==", Op::Eq),
            (">=", Op::Ge),
            ("<=", Op::Le),
            (">", Op::Gt),
            ("<", Op::Lt),
            ("=", Op::Eq),
        ];

        for (token, op) in OPERATORS {
            if let Some(idx) = s.find(token) {
                let name = &s[..idx];
                let ver = &s[idx + token.len()..];
                if !is_identifier(name) {
                    return None;
                }
                let version = Version::parse(ver)?;
                return Some(Requirement {
                    name: name.to_string(),
                    constraint: Some((*op, version)),
                    raw: s.to_string(),
                });
            }
        }

        if is_identifier(s) {
            return Some(Requirement {
                name: s.to_string(),
                constraint: None,
                raw: s.to_string(),
            });
        }
        None
    }

    /// Returns whether `declared` satisfies this requirement.
    pub fn is_satisfied_by(&self, declared: &Version) -> bool {
        match &self.constraint {
            None => true,
            Some((op, required)) => op.satisfied(declared, required),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_has_no_constraint() {
        let req = Requirement::parse("core").unwrap();
        assert_eq!(req.name, "core");
        assert!(req.constraint.is_none());
        assert!(req.is_satisfied_by(&Version::zero()));
    }

    #[test]
    fn ge_operator_parses_and_evaluates() {
        let req = Requirement::parse("core>=2.0.0").unwrap();
        assert_eq!(req.name, "core");
        assert!(!req.is_satisfied_by(&Version::parse("1.0.0").unwrap()));
        assert!(req.is_satisfied_by(&Version::parse("2.0.0").unwrap()));
        assert!(req.is_satisfied_by(&Version::parse("2.1.0").unwrap()));
    }

    #[test]
    fn ge_is_not_shadowed_by_gt() {
        let req = Requirement::parse("core>=1.0.0").unwrap();
        assert_eq!(req.constraint.unwrap().0, Op::Ge);
    }

    #[test]
    fn single_equals_is_accepted() {
        let req = Requirement::parse("core=1.0.0").unwrap();
        assert_eq!(req.constraint.unwrap().0, Op::Eq);
    }

    #[test]
    fn eq_operator_honors_padded_version_equality() {
        let req = Requirement::parse("core==1.0").unwrap();
        assert!(req.is_satisfied_by(&Version::parse("1.0.0").unwrap()));
        assert!(!req.is_satisfied_by(&Version::parse("1.0.1").unwrap()));
    }

    #[test]
    fn unparseable_requirement_is_none() {
        assert!(Requirement::parse("").is_none());
        assert!(Requirement::parse("core>=not-a-version").is_none());
        assert!(Requirement::parse("bad name>=1").is_none());
    }
}
