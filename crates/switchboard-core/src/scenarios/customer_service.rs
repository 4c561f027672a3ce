//! Snowboard retailer customer service
//!
//! Order lookup, policy retrieval, sales search and identity checks run
//! locally against canned data. Cart, checkout, address and return
//! initiation tools are left to the remote side.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::{Agent, CapabilityTier, ToolSpec};
use crate::tools::{parse_params, ToolContext, ToolHandler, ToolRegistry};

const AUTHENTICATION: &str = "authentication";
const RETURNS: &str = "returns";
const SALES: &str = "sales";
const HUMAN: &str = "simulatedHuman";

pub(super) fn agents() -> (Vec<Agent>, &'static str) {
    let authentication = Agent::new(
        AUTHENTICATION,
        "You are a calm, approachable customer service assistant for Snowy Peak Boards. \
         Greet the user, then verify their identity before anything else: collect their \
         phone number, date of birth and the last four digits of their SSN or credit card, \
         repeating each back to confirm. Once verified, transfer to the agent that fits \
         the request.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_handoff_description("The initial agent that greets the user, does authentication and routes them to the correct downstream agent.")
    .with_tool(AuthenticateUser.spec())
    .with_tool(ToolSpec::new(
        "save_or_update_address",
        "Saves or updates an address for a given phone number.",
        json!({
            "type": "object",
            "properties": {
                "phone_number": {"type": "string", "description": "The phone number associated with the address"},
                "new_address": {
                    "type": "object",
                    "properties": {
                        "street": {"type": "string"},
                        "city": {"type": "string"},
                        "state": {"type": "string"},
                        "postal_code": {"type": "string"}
                    },
                    "required": ["street", "city", "state", "postal_code"]
                }
            },
            "required": ["phone_number", "new_address"]
        }),
    ))
    .with_tool(ToolSpec::new(
        "update_user_offer_response",
        "Record the user's response to a promotional offer.",
        json!({
            "type": "object",
            "properties": {
                "phone": {"type": "string"},
                "offer_id": {"type": "string"},
                "user_response": {"type": "string", "enum": ["ACCEPTED", "DECLINED", "REMIND_ME_LATER"]}
            },
            "required": ["phone", "offer_id", "user_response"]
        }),
    ))
    .with_handoffs([RETURNS, SALES, HUMAN]);

    let returns = Agent::new(
        RETURNS,
        "You are a returns specialist for Snowy Peak Boards. Look up the user's orders, \
         confirm which item they want to return and why, check the policy for that item, \
         then check eligibility before initiating the return.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_handoff_description("Customer service agent specialized in order lookups, policy checks, and return initiations.")
    .with_tool(LookupOrders.spec())
    .with_tool(RetrievePolicy.spec())
    .with_tool(ToolSpec::new(
        "checkEligibilityAndPossiblyInitiateReturn",
        "Check the eligibility of a proposed action for a given order, initiating the return if eligible.",
        json!({
            "type": "object",
            "properties": {
                "userDesiredAction": {"type": "string"},
                "question": {"type": "string"}
            },
            "required": ["userDesiredAction", "question"]
        }),
    ))
    .with_handoffs([AUTHENTICATION, SALES, HUMAN]);

    let sales = Agent::new(
        SALES,
        "You are a sales agent for Snowy Peak Boards. Help the user find promotions and \
         new arrivals, add items to their cart and check out when they are ready.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_handoff_description("Handles sales-related inquiries, including new product details, recommendations, promotions, and purchase flows.")
    .with_tool(LookupNewSales.spec())
    .with_tool(ToolSpec::new(
        "addToCart",
        "Adds an item to the user's shopping cart.",
        json!({
            "type": "object",
            "properties": {"item_id": {"type": "string"}},
            "required": ["item_id"]
        }),
    ))
    .with_tool(ToolSpec::new(
        "checkout",
        "Initiates a checkout with the given item ids and phone number.",
        json!({
            "type": "object",
            "properties": {
                "item_ids": {"type": "array", "items": {"type": "string"}},
                "phone_number": {"type": "string"}
            },
            "required": ["item_ids", "phone_number"]
        }),
    ))
    .with_handoffs([AUTHENTICATION, RETURNS, HUMAN]);

    let human = Agent::new(
        HUMAN,
        "You are a helpful human assistant with a laid-back attitude. Greet the user and \
         say you are a human agent standing in. Speak English only.",
    )
    .with_tier(CapabilityTier::Fast)
    .with_handoff_description("Placeholder, human agent that can provide more advanced help to the user. Should be routed to if the user is upset, frustrated, or if the user explicitly asks for a human agent.")
    .with_handoffs([AUTHENTICATION, RETURNS, SALES]);

    (vec![authentication, returns, sales, human], AUTHENTICATION)
}

pub(super) fn tools() -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(AuthenticateUser))
        .with(Arc::new(LookupOrders))
        .with(Arc::new(RetrievePolicy))
        .with(Arc::new(LookupNewSales))
}

struct AuthenticateUser;

#[derive(Deserialize)]
struct AuthenticateParams {
    phone_number: String,
    #[serde(default)]
    last_4_digits: Option<String>,
}

#[async_trait]
impl ToolHandler for AuthenticateUser {
    fn name(&self) -> &str {
        "authenticate_user_information"
    }

    fn description(&self) -> &str {
        "Look up a user's information with phone, last_4_cc_digits, last_4_ssn_digits, and date_of_birth to verify and validate the user."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "phone_number": {"type": "string", "pattern": "^\\(\\d{3}\\) \\d{3}-\\d{4}$"},
                "last_4_digits": {"type": "string"},
                "last_4_digits_type": {"type": "string", "enum": ["credit_card", "ssn"]},
                "date_of_birth": {"type": "string", "pattern": "^\\d{4}-\\d{2}-\\d{2}$"}
            },
            "required": ["phone_number", "date_of_birth", "last_4_digits", "last_4_digits_type"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let params: AuthenticateParams = parse_params(params)?;
        let verified = !params.phone_number.trim().is_empty()
            && params.last_4_digits.is_some_and(|d| d.len() == 4);
        Ok(json!({ "success": verified }))
    }
}

struct LookupOrders;

#[derive(Deserialize)]
struct LookupOrdersParams {
    #[serde(rename = "phoneNumber")]
    phone_number: String,
}

#[async_trait]
impl ToolHandler for LookupOrders {
    fn name(&self) -> &str {
        "lookupOrders"
    }

    fn description(&self) -> &str {
        "Retrieve detailed order information by using the user's phone number, including shipping status and item details."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "phoneNumber": {"type": "string", "description": "The user's phone number tied to their order(s)."}
            },
            "required": ["phoneNumber"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let params: LookupOrdersParams = parse_params(params)?;
        Ok(json!({
            "phoneNumber": params.phone_number,
            "orders": [
                {
                    "order_id": "SNP-20230914-001",
                    "order_date": "2024-09-14T09:30:00Z",
                    "delivered_date": "2024-09-16T14:00:00Z",
                    "order_status": "delivered",
                    "subtotal_usd": 409.98,
                    "items": [
                        {"item_id": "SNB-TT-X01", "item_name": "Twin Tip Snowboard X", "retail_price_usd": 249.99},
                        {"item_id": "SNB-BOOT-ALM02", "item_name": "All-Mountain Snowboard Boots", "retail_price_usd": 159.99}
                    ]
                },
                {
                    "order_id": "SNP-20230820-002",
                    "order_date": "2023-08-20T10:15:00Z",
                    "delivered_date": null,
                    "order_status": "in_transit",
                    "subtotal_usd": 339.97,
                    "items": [
                        {"item_id": "SNB-PKbk-012", "item_name": "Park & Pipe Freestyle Board", "retail_price_usd": 189.99},
                        {"item_id": "GOG-037", "item_name": "Mirrored Snow Goggles", "retail_price_usd": 89.99},
                        {"item_id": "SSB-003", "item_name": "Insulated Snowboard Socks", "retail_price_usd": 59.99}
                    ]
                }
            ]
        }))
    }
}

struct RetrievePolicy;

#[async_trait]
impl ToolHandler for RetrievePolicy {
    fn name(&self) -> &str {
        "retrievePolicy"
    }

    fn description(&self) -> &str {
        "Retrieve and present the store's policies, including eligibility for returns."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "region": {"type": "string", "description": "The region where the user is located."},
                "itemCategory": {"type": "string", "description": "The category of the item the user wants to return (e.g., shoes, accessories)."}
            },
            "required": ["region", "itemCategory"]
        })
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        Ok(json!({
            "policy": "Items may be returned within 30 days of delivery in original condition with proof of purchase. \
                       Defective items may be returned within one year. Final sale and clearance items are not returnable. \
                       Snowboards showing on-snow use are not eligible unless defective. Refunds go to the original payment \
                       method within 7-10 business days of inspection."
        }))
    }
}

struct LookupNewSales;

#[derive(Deserialize)]
struct LookupNewSalesParams {
    category: String,
}

#[async_trait]
impl ToolHandler for LookupNewSales {
    fn name(&self) -> &str {
        "lookupNewSales"
    }

    fn description(&self) -> &str {
        "Checks for current promotions, discounts, or special deals. Respond with available offers relevant to the user's query."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "category": {"type": "string", "enum": ["snowboard", "apparel", "boots", "accessories", "any"]}
            },
            "required": ["category"]
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let params: LookupNewSalesParams = parse_params(params)?;
        let catalog = [
            ("101", "Alpine Blade", "snowboard", 499.99, 399.99),
            ("102", "Peak Bomber", "apparel", 149.99, 99.99),
            ("103", "Storm Rider", "boots", 229.99, 179.99),
            ("104", "Frost Fang", "accessories", 89.99, 59.99),
            ("105", "Glacier Glide", "snowboard", 599.99, 449.99),
        ];
        let items: Vec<Value> = catalog
            .iter()
            .filter(|(_, _, category, _, _)| params.category == "any" || params.category == *category)
            .map(|(id, name, category, price, sale)| {
                json!({
                    "item_id": id,
                    "name": name,
                    "type": category,
                    "price_usd": price,
                    "sale_price_usd": sale
                })
            })
            .collect();
        Ok(json!({ "sales": items }))
    }
}
