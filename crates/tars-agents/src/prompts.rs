use tars_models::analysis::AgentType;

fn response_schema() -> String {
    let example = serde_json::json!({
        "score": 35.0,
        "confidence": 70.0,
        "reasoning": "<two or three sentences>",
        "factors": ["<short factor>", "<short factor>"]
    });
    serde_json::to_string_pretty(&example).unwrap_or_default()
}

fn focus(agent_type: AgentType) -> &'static str {
    match agent_type {
        AgentType::Fundamental => {
            "You are a fundamental analyst. Judge the company behind the symbol on \
             valuation, earnings quality, revenue growth, margins, balance sheet strength \
             and guidance. Ignore short-term price action."
        }
        AgentType::News => {
            "You are a news and sentiment analyst. Judge recent headlines, analyst actions, \
             regulatory events and the overall tone of coverage for the symbol. Weigh \
             credible, recent sources above rumor."
        }
        AgentType::Technical => {
            "You are a technical analyst. Judge trend, momentum, support and resistance, \
             moving-average structure and volume for the symbol over the last few months."
        }
    }
}

/// System prompt for an agent of `agent_type`.
pub fn system_prompt(agent_type: AgentType) -> String {
    format!(
        "{}\n\n\
         ## SCORING\n\n\
         - `score`: -100 (strong sell) to 100 (strong buy), 0 is neutral.\n\
         - `confidence`: 0 to 100, how sure you are given the information available to you.\n\
         - Lower confidence when information is stale, thin or contradictory.\n\n\
         ## OUTPUT FORMAT\n\n\
         Respond with ONLY a JSON object, no markdown fences and no prose:\n{}",
        focus(agent_type),
        response_schema()
    )
}

/// User prompt for one request.
pub fn user_prompt(symbol: &str, agent_type: AgentType) -> String {
    serde_json::json!({
        "symbol": symbol,
        "analysis": agent_type.as_str(),
        "requested_at": chrono::Utc::now().to_rfc3339(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_mention_schema_fields() {
        for agent_type in AgentType::ALL {
            let prompt = system_prompt(agent_type);
            assert!(prompt.contains("\"score\""));
            assert!(prompt.contains("\"confidence\""));
            assert!(prompt.contains("\"reasoning\""));
        }
        assert!(system_prompt(AgentType::News).contains("sentiment"));
    }

    #[test]
    fn user_prompt_is_json() {
        let value: serde_json::Value = serde_json::from_str(&user_prompt("MSFT", AgentType::Technical)).unwrap();
        assert_eq!(value["symbol"], "MSFT");
        assert_eq!(value["analysis"], "technical");
    }
}
