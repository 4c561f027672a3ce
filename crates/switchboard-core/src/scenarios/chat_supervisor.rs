//! Fast chat agent backed by a supervisor

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::{Agent, CapabilityTier};
use crate::escalation::supervisor_tool_spec;
use crate::tools::{parse_params, ToolContext, ToolHandler, ToolRegistry};

const CHAT_AGENT: &str = "chatAgent";
const SUPERVISOR: &str = "supervisorAgent";

pub(super) fn agents() -> (Vec<Agent>, &'static str) {
    let chat = Agent::new(
        CHAT_AGENT,
        "You are a helpful junior customer service agent for NewTelco. Handle greetings \
         and small talk yourself. For anything else, including account questions, \
         policies and store locations, first say a short filler phrase such as \
         \"Let me look into that\", then call getNextResponseFromSupervisor and read \
         its nextResponse to the user verbatim.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_tool(supervisor_tool_spec());

    let supervisor = Agent::new(
        SUPERVISOR,
        "You are an expert customer service supervisor for NewTelco, guiding a junior \
         agent who is talking to the customer. Use your tools to ground every answer in \
         policy or account data, and reply with exactly what the junior agent should say. \
         Keep answers short and conversational; never use lists or formatting.",
    )
    .with_tier(CapabilityTier::Escalated)
    .with_tool(LookupPolicyDocument.spec())
    .with_tool(GetUserAccountInfo.spec())
    .with_tool(FindNearestStore.spec());

    (vec![chat, supervisor], CHAT_AGENT)
}

pub(super) fn tools() -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(LookupPolicyDocument))
        .with(Arc::new(GetUserAccountInfo))
        .with(Arc::new(FindNearestStore))
}

struct LookupPolicyDocument;

#[derive(Deserialize)]
struct PolicyParams {
    topic: String,
}

const POLICIES: &[(&str, &str, &str)] = &[
    (
        "ID-010",
        "Family Plan Policy",
        "The family plan allows up to 5 lines per account. All lines share a single data pool. \
         Each additional line after the first receives a 10% discount. All lines must be on the same account.",
    ),
    (
        "ID-020",
        "Promotions and Discounts Policy",
        "The Summer Unlimited Data Sale provides a 20% discount on the Unlimited Plus plan for the first \
         6 months for new activations completed by July 31, 2025.",
    ),
    (
        "ID-030",
        "International Plans Policy",
        "International plans are available and include discounted calling, texting, and data usage in \
         over 100 countries.",
    ),
    (
        "ID-040",
        "Handsets Offers Policy",
        "Handsets from brands such as iPhone and Google are available. The iPhone 16 is $200 and the \
         Google Pixel 8 is available for $0, both with an additional 18-month commitment.",
    ),
];

#[async_trait]
impl ToolHandler for LookupPolicyDocument {
    fn name(&self) -> &str {
        "lookupPolicyDocument"
    }

    fn description(&self) -> &str {
        "Tool to look up internal documents and policies by topic or keyword."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": {"type": "string", "description": "The topic or keyword to search for in company policies or documents."}
            },
            "required": ["topic"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let params: PolicyParams = parse_params(params)?;
        let topic = params.topic.to_lowercase();
        let matches: Vec<Value> = POLICIES
            .iter()
            .filter(|(_, name, body)| {
                topic
                    .split_whitespace()
                    .any(|word| name.to_lowercase().contains(word) || body.to_lowercase().contains(word))
            })
            .map(|(id, name, body)| json!({"id": id, "name": name, "topic": params.topic, "content": body}))
            .collect();
        Ok(json!({ "documents": matches }))
    }
}

struct GetUserAccountInfo;

#[derive(Deserialize)]
struct AccountParams {
    phone_number: String,
}

#[async_trait]
impl ToolHandler for GetUserAccountInfo {
    fn name(&self) -> &str {
        "getUserAccountInfo"
    }

    fn description(&self) -> &str {
        "Tool to get user account information. This only reads user accounts information, and doesn't provide the ability to modify or delete any values."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "phone_number": {"type": "string", "description": "Formatted as '(xxx) xxx-xxxx'. MUST be provided by the user, never a null or empty string."}
            },
            "required": ["phone_number"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let params: AccountParams = parse_params(params)?;
        if params.phone_number.trim().is_empty() {
            anyhow::bail!("phone_number must not be empty");
        }
        Ok(json!({
            "account_id": "NT-123456",
            "name": "Alex Johnson",
            "phone_number": params.phone_number,
            "plan": "Unlimited Plus",
            "balance_due": "$42.17",
            "last_bill_date": "2024-05-15",
            "last_payment_date": "2024-05-20",
            "last_payment_amount": "$42.17",
            "data_used_gb": "18.7",
            "data_limit_gb": "Unlimited",
            "autopay_enabled": true,
            "lines": 2
        }))
    }
}

struct FindNearestStore;

#[derive(Deserialize)]
struct StoreParams {
    zip_code: String,
}

#[async_trait]
impl ToolHandler for FindNearestStore {
    fn name(&self) -> &str {
        "findNearestStore"
    }

    fn description(&self) -> &str {
        "Tool to find the nearest store location to a customer, given their zip code."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "zip_code": {"type": "string", "description": "The customer's 5-digit zip code."}
            },
            "required": ["zip_code"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let params: StoreParams = parse_params(params)?;
        Ok(json!({
            "zip_code": params.zip_code,
            "stores": [
                {
                    "name": "NewTelco San Francisco Downtown Store",
                    "address": "1 Market St, San Francisco, CA 94105",
                    "phone": "(415) 555-1001",
                    "hours": "Mon-Sat 10am-7pm, Sun 11am-5pm"
                },
                {
                    "name": "NewTelco San Jose Valley Fair Store",
                    "address": "2855 Stevens Creek Blvd, Santa Clara, CA 95050",
                    "phone": "(408) 555-2002",
                    "hours": "Mon-Sat 10am-8pm, Sun 11am-6pm"
                }
            ]
        }))
    }
}
