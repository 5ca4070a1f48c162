use std::fmt;
use std::str::FromStr;

use super::error::MigrationError;

/// A migration destination as written on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The single head of the graph.
    Head,
    /// Every head.
    Heads,
    /// Before the first revision.
    Base,
    /// A revision id, unique id prefix, or branch label.
    Revision(String),
    /// The head of the branch containing the named revision or label.
    BranchHead(String),
    /// N revisions forward (positive) or backward (negative) from current.
    Relative(i64),
}

impl FromStr for Target {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "" => Err(MigrationError::UnknownRevision(String::new())),
            "head" => Ok(Target::Head),
            "heads" => Ok(Target::Heads),
            "base" => Ok(Target::Base),
            _ => {
                if let Some(rest) = s.strip_prefix('+').or_else(|| s.strip_prefix('-')) {
                    if rest.starts_with(|c: char| c == '+' || c == '-') {
                        return Err(MigrationError::UnknownRevision(s.to_string()));
                    }
                    let n: i64 = rest
                        .parse()
                        .map_err(|_| MigrationError::UnknownRevision(s.to_string()))?;
                    return Ok(Target::Relative(if s.starts_with('-') { -n } else { n }));
                }
                if let Some(branch) = s.strip_suffix("@head") {
                    if branch.is_empty() {
                        return Err(MigrationError::UnknownRevision(s.to_string()));
                    }
                    return Ok(Target::BranchHead(branch.to_string()));
                }
                Ok(Target::Revision(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Head => f.write_str("head"),
            Target::Heads => f.write_str("heads"),
            Target::Base => f.write_str("base"),
            Target::Revision(r) => f.write_str(r),
            Target::BranchHead(b) => write!(f, "{}@head", b),
            Target::Relative(n) if *n >= 0 => write!(f, "+{}", n),
            Target::Relative(n) => write!(f, "{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords() {
        assert_eq!("head".parse::<Target>().unwrap(), Target::Head);
        assert_eq!("heads".parse::<Target>().unwrap(), Target::Heads);
        assert_eq!(" base ".parse::<Target>().unwrap(), Target::Base);
    }

    #[test]
    fn test_parse_relative() {
        assert_eq!("+2".parse::<Target>().unwrap(), Target::Relative(2));
        assert_eq!("-1".parse::<Target>().unwrap(), Target::Relative(-1));
        assert!("+x".parse::<Target>().is_err());
        assert!("--1".parse::<Target>().is_err());
        assert!("+-2".parse::<Target>().is_err());
        assert!("-+2".parse::<Target>().is_err());
        assert_eq!(Target::Relative(-3).to_string(), "-3");
        assert_eq!(Target::Relative(1).to_string(), "+1");
    }

    #[test]
    fn test_parse_branch_head_and_revision() {
        assert_eq!(
            "spaces@head".parse::<Target>().unwrap(),
            Target::BranchHead("spaces".into())
        );
        assert_eq!(
            "8b4e".parse::<Target>().unwrap(),
            Target::Revision("8b4e".into())
        );
        assert!("@head".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }
}
