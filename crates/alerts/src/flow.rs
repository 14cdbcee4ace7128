//! Conversational state for adding an alert step by step.

use crate::config::StepMenu;
use pricestep_core::{normalize_symbol, Step};

/// Ticker shape accepted from chat input: 2 to 10 of `A-Z`, `0-9`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    (2..=10).contains(&symbol.len())
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    AwaitingSymbol,
    AwaitingStep { symbol: String },
}

/// What the chat handler should do after feeding text to the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowAction {
    /// No flow in progress; the text is not for us.
    Ignored,
    /// Symbol accepted, show the step menu.
    AskStep { symbol: String },
    /// Bad symbol; still waiting for one.
    InvalidSymbol(String),
    /// Bad step; still waiting for one.
    InvalidStep(String),
    /// Both inputs collected. The flow is idle again.
    Complete { symbol: String, step: Step },
}

/// `Idle -> AwaitingSymbol -> AwaitingStep { symbol } -> Idle`.
#[derive(Debug, Clone, Default)]
pub struct AddAlertFlow {
    state: FlowState,
}

impl AddAlertFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == FlowState::Idle
    }

    /// Begin a new flow, discarding any partial input.
    pub fn start(&mut self) {
        self.state = FlowState::AwaitingSymbol;
    }

    /// Begin with the symbol already given (`/add BTC`).
    pub fn start_with_symbol(&mut self, input: &str) -> FlowAction {
        self.start();
        self.accept_symbol(input)
    }

    /// Returns `true` if a flow was in progress.
    pub fn cancel(&mut self) -> bool {
        let was_active = !self.is_idle();
        self.state = FlowState::Idle;
        was_active
    }

    pub fn on_text(&mut self, text: &str, menu: &StepMenu) -> FlowAction {
        match std::mem::take(&mut self.state) {
            FlowState::Idle => FlowAction::Ignored,
            FlowState::AwaitingSymbol => {
                self.state = FlowState::AwaitingSymbol;
                self.accept_symbol(text)
            }
            FlowState::AwaitingStep { symbol } => match menu.resolve(text) {
                Ok(step) => FlowAction::Complete { symbol, step },
                Err(e) => {
                    self.state = FlowState::AwaitingStep { symbol };
                    FlowAction::InvalidStep(e.to_string())
                }
            },
        }
    }

    fn accept_symbol(&mut self, input: &str) -> FlowAction {
        let symbol = normalize_symbol(input);
        if !is_valid_symbol(&symbol) {
            return FlowAction::InvalidSymbol(symbol);
        }
        self.state = FlowState::AwaitingStep {
            symbol: symbol.clone(),
        };
        FlowAction::AskStep { symbol }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn menu() -> StepMenu {
        "0.5,10,1000".parse().unwrap()
    }

    #[test]
    fn test_symbol_shape() {
        assert!(is_valid_symbol("BTC"));
        assert!(is_valid_symbol("1INCH"));
        assert!(is_valid_symbol("AB"));
        assert!(is_valid_symbol("ABCDEFGHIJ"));
        assert!(!is_valid_symbol("A"));
        assert!(!is_valid_symbol("ABCDEFGHIJK"));
        assert!(!is_valid_symbol("BTC-USD"));
        assert!(!is_valid_symbol("btc"));
        assert!(!is_valid_symbol(""));
    }

    #[test]
    fn test_idle_ignores_text() {
        let mut flow = AddAlertFlow::new();
        assert_eq!(flow.on_text("BTC", &menu()), FlowAction::Ignored);
        assert!(flow.is_idle());
    }

    #[test]
    fn test_full_flow() {
        let mut flow = AddAlertFlow::new();
        flow.start();
        assert_eq!(flow.state(), &FlowState::AwaitingSymbol);

        assert_eq!(
            flow.on_text(" eth ", &menu()),
            FlowAction::AskStep {
                symbol: "ETH".to_string()
            }
        );
        assert_eq!(
            flow.state(),
            &FlowState::AwaitingStep {
                symbol: "ETH".to_string()
            }
        );

        assert_eq!(
            flow.on_text("2", &menu()),
            FlowAction::Complete {
                symbol: "ETH".to_string(),
                step: "10".parse().unwrap()
            }
        );
        assert!(flow.is_idle());
    }

    #[test]
    fn test_invalid_symbol_keeps_waiting() {
        let mut flow = AddAlertFlow::new();
        flow.start();
        assert_eq!(
            flow.on_text("BTC/USDT", &menu()),
            FlowAction::InvalidSymbol("BTC/USDT".to_string())
        );
        assert_eq!(flow.state(), &FlowState::AwaitingSymbol);
    }

    #[test]
    fn test_invalid_step_keeps_symbol() {
        let mut flow = AddAlertFlow::new();
        flow.start_with_symbol("SOL");

        assert!(matches!(
            flow.on_text("0", &menu()),
            FlowAction::InvalidStep(_)
        ));
        assert!(matches!(
            flow.on_text("-5", &menu()),
            FlowAction::InvalidStep(_)
        ));
        assert_eq!(
            flow.state(),
            &FlowState::AwaitingStep {
                symbol: "SOL".to_string()
            }
        );

        assert_eq!(
            flow.on_text("0.25", &menu()),
            FlowAction::Complete {
                symbol: "SOL".to_string(),
                step: "0.25".parse().unwrap()
            }
        );
    }

    #[test]
    fn test_start_with_invalid_symbol_waits_for_symbol() {
        let mut flow = AddAlertFlow::new();
        assert_eq!(
            flow.start_with_symbol("x"),
            FlowAction::InvalidSymbol("X".to_string())
        );
        assert_eq!(flow.state(), &FlowState::AwaitingSymbol);
    }

    #[test]
    fn test_cancel() {
        let mut flow = AddAlertFlow::new();
        assert!(!flow.cancel());
        flow.start_with_symbol("BTC");
        assert!(flow.cancel());
        assert!(flow.is_idle());
    }
}
