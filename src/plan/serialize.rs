//! Textual (JSON) encoding of execution plans.
//!
//! Serialization is provided for debugging and hand-off between processes;
//! long-term schema compatibility is not guaranteed. Deserialized plans are
//! re-validated before use.

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::plan::ExecutionPlan;

/// Serializes a plan to pretty-printed JSON.
pub fn serialize_plan(plan: &ExecutionPlan) -> EngineResult<String> {
    serde_json::to_string_pretty(plan).map_err(|err| {
        EngineError::new(
            ErrorKind::Validation,
            format!("failed to serialize execution plan: {err}"),
        )
    })
}

/// Deserializes a plan from JSON and re-validates its invariants.
pub fn deserialize_plan(text: &str) -> EngineResult<ExecutionPlan> {
    let plan: ExecutionPlan = serde_json::from_str(text).map_err(|err| {
        EngineError::new(
            ErrorKind::Validation,
            format!("failed to parse execution plan: {err}"),
        )
    })?;
    plan.validate()?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::optimizer::Optimizer;
    use crate::parser::Parser;
    use crate::plan::Planner;

    fn build_plan(source: &str) -> ExecutionPlan {
        let lex = tokenize(source);
        let program = Parser::new(lex.tokens, source)
            .with_lexer_diagnostics(lex.diagnostics)
            .parse()
            .ast
            .expect("parse");
        let outcome = Optimizer::new().optimize(program);
        Planner::new().plan(&outcome).expect("plan")
    }

    #[test]
    fn round_trip_preserves_structure() {
        let plan = build_plan(
            "SELECT title, price FROM 'https://x.com' WHERE price > 3 ORDER BY price LIMIT 5",
        );
        let text = serialize_plan(&plan).unwrap();
        let restored = deserialize_plan(&text).unwrap();
        assert_eq!(plan, restored);
    }

    #[test]
    fn round_trip_nested_steps() {
        let plan =
            build_plan("FOR EACH u IN ['https://a.com', 'https://b.com'] { NAVIGATE TO u }");
        let text = serialize_plan(&plan).unwrap();
        let restored = deserialize_plan(&text).unwrap();
        assert_eq!(plan, restored);
    }

    #[test]
    fn tampered_plan_fails_validation() {
        let mut plan = build_plan("SELECT title FROM 'https://x.com'");
        // Point the DOM query at a nonexistent dependency before encoding.
        plan.steps[1].dependencies = vec!["step_9".into()];
        let text = serialize_plan(&plan).unwrap();
        let err = deserialize_plan(&text).unwrap_err();
        assert!(err.message.contains("unknown step"));
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(deserialize_plan("not json").is_err());
        assert!(deserialize_plan("{}").is_err());
    }
}
