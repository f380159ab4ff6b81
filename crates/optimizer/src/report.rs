#![allow(clippy::format_push_string)]
#![allow(clippy::uninlined_format_args)]

use crate::optimizer::OptimizationResult;

pub struct ReportFormatter;

impl ReportFormatter {
    #[must_use]
    pub fn format(result: &OptimizationResult) -> String {
        let mut output = String::new();

        output.push('\n');
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push_str("                   OPTIMIZATION RESULT                         \n");
        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output.push('\n');

        output.push_str("Strategy Scores\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        for score in &result.scores {
            output.push_str(&format!(
                "{:<20} {:>5}/10000 {} ({})\n",
                score.strategy,
                score.total_score,
                if score.recommended { "✓" } else { " " },
                score.reasoning
            ));
        }
        output.push('\n');

        output.push_str("Proposal\n");
        output.push_str("───────────────────────────────────────────────────────────────\n");
        for (score, alloc) in result.scores.iter().zip(&result.recommended_allocation) {
            output.push_str(&format!(
                "{:<20} {:>5} bps\n",
                score.strategy, alloc
            ));
        }
        output.push_str(&format!(
            "Expected Saving:       {} bps\n",
            result.expected_saving_bps
        ));
        output.push_str(&format!(
            "Risk Reduction:        {}\n",
            result.expected_risk_reduction
        ));
        output.push_str(&format!(
            "Implementation Cost:   {} gas\n",
            result.implementation_cost
        ));
        output.push_str(&format!(
            "Horizon:               {} s\n",
            result.time_horizon_secs
        ));
        output.push_str(&format!(
            "Confidence:            {}%\n",
            result.confidence
        ));
        output.push_str(&format!(
            "Rebalance:             {}\n",
            if result.should_rebalance { "YES" } else { "no" }
        ));
        output.push('\n');

        if !result.instructions.is_empty() {
            output.push_str("Instructions\n");
            output.push_str("───────────────────────────────────────────────────────────────\n");
            for instruction in &result.instructions {
                output.push_str(&format!(
                    "[P{}] {} → {} : {}\n",
                    instruction.priority,
                    instruction.from_strategy.as_deref().unwrap_or("-"),
                    instruction.to_strategy.as_deref().unwrap_or("-"),
                    instruction.amount
                ));
            }
            output.push('\n');
        }

        output.push_str("═══════════════════════════════════════════════════════════════\n");
        output
    }
}
