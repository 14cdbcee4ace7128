//! Step menu offered when adding an alert.

use pricestep_core::{AlertError, Step};
use std::fmt;
use std::str::FromStr;

/// Default comma-separated step options.
pub const DEFAULT_STEP_OPTIONS: &str = "0.001,0.01,0.1,0.2,0.5,1,10,100,1000,10000";

/// Ordered list of preset steps a user can pick by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMenu {
    options: Vec<Step>,
}

impl StepMenu {
    pub fn new(options: Vec<Step>) -> Result<Self, AlertError> {
        if options.is_empty() {
            return Err(AlertError::InvalidSetting("empty step menu".to_string()));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> &[Step] {
        &self.options
    }

    /// 1-based lookup, as shown to users.
    pub fn pick(&self, index: usize) -> Option<Step> {
        index
            .checked_sub(1)
            .and_then(|i| self.options.get(i))
            .copied()
    }

    /// Resolve user input: a menu index (`"3"`) or a decimal value (`"0.25"`, `"$5"`).
    ///
    /// Input containing a decimal point or currency sign is always a value.
    pub fn resolve(&self, input: &str) -> Result<Step, AlertError> {
        let input = input.trim();
        let looks_like_index = !input.is_empty() && input.chars().all(|c| c.is_ascii_digit());
        if looks_like_index {
            if let Some(step) = input.parse::<usize>().ok().and_then(|i| self.pick(i)) {
                return Ok(step);
            }
        }
        input.parse()
    }
}

impl Default for StepMenu {
    fn default() -> Self {
        DEFAULT_STEP_OPTIONS
            .parse()
            .unwrap_or_else(|_| Self { options: Vec::new() })
    }
}

impl FromStr for StepMenu {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let options = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse::<Step>)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(options)
    }
}

impl fmt::Display for StepMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.options.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}. ${}", i + 1, step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_menu() {
        let menu = StepMenu::default();
        assert_eq!(menu.options().len(), 10);
        assert_eq!(menu.pick(1), Some("0.001".parse().unwrap()));
        assert_eq!(menu.pick(10), Some("10000".parse().unwrap()));
        assert_eq!(menu.pick(0), None);
        assert_eq!(menu.pick(11), None);
    }

    #[test]
    fn test_parse_rejects_non_positive() {
        assert!("1,0,5".parse::<StepMenu>().is_err());
        assert!("1,-2".parse::<StepMenu>().is_err());
        assert!("abc".parse::<StepMenu>().is_err());
        assert!("".parse::<StepMenu>().is_err());
    }

    #[test]
    fn test_parse_tolerates_spacing() {
        let menu: StepMenu = " 0.5 , 2,, 10 ".parse().unwrap();
        assert_eq!(menu.options().len(), 3);
    }

    #[test]
    fn test_resolve_index_or_value() {
        let menu: StepMenu = "0.5,2,10".parse().unwrap();
        assert_eq!(menu.resolve("2").unwrap(), "2".parse().unwrap());
        assert_eq!(menu.resolve("3").unwrap(), "10".parse().unwrap());
        // Out of menu range: taken as a literal value.
        assert_eq!(menu.resolve("25").unwrap(), "25".parse().unwrap());
        assert_eq!(menu.resolve("0.25").unwrap(), "0.25".parse().unwrap());
        assert_eq!(menu.resolve("$5").unwrap(), "5".parse().unwrap());
        assert!(menu.resolve("0").is_err());
        assert!(menu.resolve("-1").is_err());
        assert!(menu.resolve("ten").is_err());
    }

    #[test]
    fn test_display_lists_numbered_options() {
        let menu: StepMenu = "0.5,10".parse().unwrap();
        assert_eq!(menu.to_string(), "1. $0.5\n2. $10");
    }
}
