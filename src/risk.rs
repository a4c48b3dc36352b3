//! Risk heuristic for shell commands.
//!
//! This is an advisory gate, NOT a security boundary: a case-insensitive
//! substring match against a short denylist. Anything it does not recognise
//! (`rm -r -f`, `:(){ :|:& };:`, `doas`, scripts that delete files) is
//! reported `Safe`. Its only job is to decide when the user must confirm a
//! command before it runs.

use std::fmt;

/// Tokens that mark a command risky wherever they appear.
const DANGEROUS_TOKENS: &[&str] = &[
    "rm -rf",
    ":(){:|:&};:",
    "shutdown",
    "reboot",
    "format",
    "mkfs",
    "dd if=",
];

const PRIVILEGE_TOKEN: &str = "sudo";

/// Verbs that mark a command risky when they open it.
const DESTRUCTIVE_PREFIXES: &[&str] = &["del ", "rm ", "rmdir ", "format "];

/// Classifier output for a candidate shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskVerdict {
    Safe,
    Risky { reason: &'static str },
}

impl RiskVerdict {
    pub fn is_risky(&self) -> bool {
        matches!(self, Self::Risky { .. })
    }
}

impl fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "safe"),
            Self::Risky { reason } => write!(f, "risky ({})", reason.trim_end()),
        }
    }
}

/// Classify a raw command line.
pub fn classify(raw: &str) -> RiskVerdict {
    let lower = raw.to_lowercase();

    if let Some(token) = DANGEROUS_TOKENS.iter().copied().find(|t| lower.contains(t)) {
        return RiskVerdict::Risky { reason: token };
    }
    if lower.contains(PRIVILEGE_TOKEN) {
        return RiskVerdict::Risky {
            reason: PRIVILEGE_TOKEN,
        };
    }
    let trimmed = lower.trim();
    if let Some(prefix) = DESTRUCTIVE_PREFIXES
        .iter()
        .copied()
        .find(|p| trimmed.starts_with(p))
    {
        return RiskVerdict::Risky { reason: prefix };
    }

    RiskVerdict::Safe
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recursive_delete_is_risky() {
        assert_eq!(
            classify("rm -rf /tmp/x"),
            RiskVerdict::Risky { reason: "rm -rf" }
        );
    }

    #[test]
    fn test_listing_is_safe() {
        assert_eq!(classify("ls -la"), RiskVerdict::Safe);
        assert_eq!(classify("echo hello && pwd"), RiskVerdict::Safe);
    }

    #[test]
    fn test_sudo_is_risky() {
        assert_eq!(
            classify("sudo apt update"),
            RiskVerdict::Risky { reason: "sudo" }
        );
    }

    #[test]
    fn test_prefix_rule() {
        assert_eq!(
            classify("del file.txt"),
            RiskVerdict::Risky { reason: "del " }
        );
        assert!(classify("   rmdir build").is_risky());
        assert!(classify("rm notes.txt").is_risky());
        // Prefix verbs only count at the start.
        assert_eq!(classify("echo del me"), RiskVerdict::Safe);
    }

    #[test]
    fn test_case_insensitive() {
        assert!(classify("SHUTDOWN /s /t 0").is_risky());
        assert!(classify("Sudo reboot").is_risky());
        assert!(classify("MKFS.ext4 /dev/sdb1").is_risky());
    }

    #[test]
    fn test_fork_bomb_and_disk_write() {
        assert!(classify(":(){:|:&};:").is_risky());
        assert!(classify("dd if=/dev/zero of=/dev/sda").is_risky());
    }

    #[test]
    fn test_empty_is_safe() {
        assert_eq!(classify(""), RiskVerdict::Safe);
        assert_eq!(classify("   "), RiskVerdict::Safe);
    }

    #[test]
    fn test_heuristic_limits_are_documented_behaviour() {
        // Substring match: harmless commands containing a token are flagged...
        assert!(classify("git format-patch HEAD~1").is_risky());
        // ...and spaced-out variants slip through.
        assert_eq!(classify("rm -r -f /tmp/x"), RiskVerdict::Safe);
    }

    #[test]
    fn test_display() {
        assert_eq!(RiskVerdict::Safe.to_string(), "safe");
        assert_eq!(classify("rm a").to_string(), "risky (rm)");
    }
}
