//! `recommend_product`: surface a platform feature the user has access to.

use async_trait::async_trait;
use finassist_core::artifact::{Artifact, ArtifactKind};
use finassist_core::error::ToolError;
use finassist_core::tool::{Tool, ToolContext, ToolOutput};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::format::{failed, parse_args, render_artifact, tool_message_content};

/// One entry of the product catalog. Serialized as the artifact payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub product_name: &'static str,
    pub product_slug: &'static str,
    pub description: &'static str,
    pub cta_text: &'static str,
    pub cta_link: Option<&'static str>,
    pub client_name: &'static str,
}

const CLIENT_NAME: &str = "FinAssist";

/// Built-in catalog, keyed by product key.
pub const CATALOG: &[(&str, Product)] = &[
    (
        "pslf_assist",
        Product {
            product_name: "PSLF Assist",
            product_slug: "pslf-assist",
            description: "Guided Public Service Loan Forgiveness enrollment, employer certification and progress tracking.",
            cta_text: "Learn more",
            cta_link: Some("/pslf"),
            client_name: CLIENT_NAME,
        },
    ),
    (
        "idr_enrollment",
        Product {
            product_name: "Income-Driven Repayment Enrollment",
            product_slug: "idr-enrollment",
            description: "Compare income-driven repayment plans and submit your application in one place.",
            cta_text: "Learn more",
            cta_link: Some("/idr"),
            client_name: CLIENT_NAME,
        },
    ),
    (
        "refinance_marketplace",
        Product {
            product_name: "Refinance Marketplace",
            product_slug: "refinance-marketplace",
            description: "Check personalized refinance offers from partner lenders without affecting your credit score.",
            cta_text: "See offers",
            cta_link: Some("/refinance"),
            client_name: CLIENT_NAME,
        },
    ),
    (
        "student_loan_match",
        Product {
            product_name: "Student Loan Retirement Match",
            product_slug: "student-loan-match",
            description: "Earn employer retirement contributions based on the student loan payments you already make.",
            cta_text: "Learn more",
            cta_link: Some("/match"),
            client_name: CLIENT_NAME,
        },
    ),
    (
        "emergency_savings",
        Product {
            product_name: "Emergency Savings",
            product_slug: "emergency-savings",
            description: "Build an emergency fund with automatic contributions from each paycheck.",
            cta_text: "Start saving",
            cta_link: None,
            client_name: CLIENT_NAME,
        },
    ),
];

pub fn lookup(key: &str) -> Option<&'static Product> {
    CATALOG.iter().find(|(k, _)| *k == key).map(|(_, p)| p)
}

#[derive(Debug, Deserialize)]
struct RecommendArgs {
    product_key: String,
}

pub struct RecommendProductTool;

impl RecommendProductTool {
    const NAME: &'static str = "recommend_product";
}

#[async_trait]
impl Tool for RecommendProductTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Display a product recommendation component that links to a platform feature relevant to \
         the user's debt or savings situation. Pass the exact product key. Only recommend products \
         the user has access to."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let keys: Vec<&str> = CATALOG.iter().map(|(k, _)| *k).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_key": {
                    "type": "string",
                    "enum": keys,
                    "description": "Key of the product to recommend"
                }
            },
            "required": ["product_key"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext<'_>,
    ) -> Result<ToolOutput, ToolError> {
        let args: RecommendArgs = parse_args(arguments)?;
        let allowed = &ctx.state.user_info.product_combination;

        if !allowed.contains(&args.product_key) {
            warn!(tool = Self::NAME, product_key = %args.product_key, "Product not available to user");
            return Err(failed(
                Self::NAME,
                format!("You can only recommend products the user has access to: {allowed:?}"),
            ));
        }
        let product = lookup(&args.product_key).ok_or_else(|| {
            warn!(tool = Self::NAME, product_key = %args.product_key, "Product missing from catalog");
            failed(Self::NAME, "Unable to load product information. Please try again later")
        })?;

        let data = serde_json::to_value(product).map_err(|e| failed(Self::NAME, e.to_string()))?;
        let description = format!(
            "Product recommendation component for {} with CTA button that links out to the {CLIENT_NAME} feature.",
            product.product_name
        );
        let artifact = Artifact::new(
            ctx.call_id,
            ArtifactKind::ProductRecommendation,
            product.product_name,
            description.clone(),
            data,
        );
        let content = tool_message_content(ctx.call_id, true, product.product_name, &description, None);
        Ok(render_artifact(ctx, Self::NAME, artifact, content).await)
    }
}
