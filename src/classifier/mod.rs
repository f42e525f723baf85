//! Parsing and rule-based classification of activity records

pub mod indicators;
pub mod parser;
pub mod rules;

pub use parser::{ParseFault, parse_delimited_row, parse_input, parse_structured_line};
pub use rules::{Rule, classify, classify_with_rule};

use crate::models::ClassificationResult;

/// Error-status result built straight from a parse fault; the rule engine
/// is never consulted for input that did not parse.
pub fn fault_result(fault: &ParseFault) -> ClassificationResult {
    ClassificationResult::error(fault.to_string())
}

/// Parse and classify one free-standing input, reporting the deciding rule
pub fn classify_input(input: &str) -> Result<(Rule, ClassificationResult), ParseFault> {
    parse_input(input).map(|record| classify_with_rule(&record))
}
