//! Agent that drafts marketplace-specific product listings.
//!
//! Copy is composed from the product document with a rule-based composer,
//! clamped to the per-marketplace guidelines, then scored for compliance
//! and confidence. Wiring a generative model in front of the composer is
//! the embedding application's concern, not this crate's.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::agent::{Agent, TaskContext, TaskOutput};
use crate::error::Result;

/// Formatting and compliance limits for one marketplace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceGuidelines {
    pub title_max_length: usize,
    pub bullet_points: usize,
    pub bullet_max_length: usize,
    pub description_max_length: usize,
    pub keywords_max: usize,
    pub style: String,
}

/// A drafted listing, clamped to the target marketplace's guidelines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingDraft {
    pub title: String,
    pub bullet_points: Vec<String>,
    pub description: String,
    pub keywords: Vec<String>,
}

/// Guideline-compliance report for a drafted listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub compliance_score: f64,
}

/// Drafts product listings for the configured marketplaces
pub struct ListingGeneratorAgent {
    guidelines: HashMap<String, MarketplaceGuidelines>,
    supported_languages: Vec<String>,
}

impl Default for ListingGeneratorAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingGeneratorAgent {
    pub fn new() -> Self {
        let mut guidelines = HashMap::new();
        guidelines.insert(
            "amazon".to_string(),
            MarketplaceGuidelines {
                title_max_length: 200,
                bullet_points: 5,
                bullet_max_length: 1000,
                description_max_length: 2000,
                keywords_max: 5,
                style: "professional, benefit-focused, SEO-optimized".into(),
            },
        );
        guidelines.insert(
            "ebay".to_string(),
            MarketplaceGuidelines {
                title_max_length: 80,
                bullet_points: 10,
                bullet_max_length: 500,
                description_max_length: 5000,
                keywords_max: 12,
                style: "direct, searchable, feature-rich".into(),
            },
        );
        guidelines.insert(
            "otto".to_string(),
            MarketplaceGuidelines {
                title_max_length: 100,
                bullet_points: 6,
                bullet_max_length: 800,
                description_max_length: 3000,
                keywords_max: 8,
                style: "German-focused, technical accuracy, compliance-aware".into(),
            },
        );
        Self {
            guidelines,
            supported_languages: vec!["en".into(), "de".into(), "zh".into()],
        }
    }

    /// Guidelines for a marketplace, if it is supported
    pub fn guidelines(&self, marketplace: &str) -> Option<&MarketplaceGuidelines> {
        self.guidelines.get(marketplace)
    }

    fn compose(product: &Map<String, Value>, guidelines: &MarketplaceGuidelines) -> ListingDraft {
        let title = str_field(product, "title");
        let brand = str_field(product, "brand");
        let category = str_field(product, "category");
        let description = str_field(product, "description");

        let full_title = if brand.is_empty() {
            title.clone()
        } else {
            format!("{brand} {title}")
        };

        let mut bullets: Vec<String> = product
            .get("attributes")
            .and_then(|a| a.get("features"))
            .and_then(Value::as_array)
            .map(|features| {
                features
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if let Some(specs) = product.get("specifications").and_then(Value::as_object) {
            for (key, value) in specs {
                bullets.push(format!("{key}: {}", render(value)));
            }
        }

        let mut full_description = description;
        if !category.is_empty() {
            full_description = format!("{full_description}\n\nCategory: {category}");
        }

        let mut keywords: Vec<String> = Vec::new();
        for candidate in [category.as_str(), brand.as_str()]
            .into_iter()
            .chain(title.split_whitespace())
        {
            let keyword = candidate.trim().to_lowercase();
            if keyword.len() > 2 && !keywords.contains(&keyword) {
                keywords.push(keyword);
            }
        }

        Self::clamp(
            ListingDraft {
                title: full_title,
                bullet_points: bullets,
                description: full_description,
                keywords,
            },
            guidelines,
        )
    }

    /// Truncates every field to the marketplace limits
    fn clamp(mut draft: ListingDraft, guidelines: &MarketplaceGuidelines) -> ListingDraft {
        draft.title = truncate(draft.title.trim(), guidelines.title_max_length);
        draft.bullet_points = draft
            .bullet_points
            .into_iter()
            .take(guidelines.bullet_points)
            .map(|bullet| truncate(bullet.trim(), guidelines.bullet_max_length))
            .filter(|bullet| !bullet.is_empty())
            .collect();
        draft.description = truncate(draft.description.trim(), guidelines.description_max_length);
        draft.keywords = draft
            .keywords
            .into_iter()
            .take(guidelines.keywords_max)
            .collect();
        draft
    }

    fn validate_draft(draft: &ListingDraft, guidelines: &MarketplaceGuidelines) -> ListingValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if draft.title.is_empty() {
            errors.push("Title is required".to_string());
        } else if draft.title.len() > guidelines.title_max_length {
            warnings.push(format!(
                "Title exceeds maximum length ({} chars)",
                draft.title.len()
            ));
        }

        if draft.bullet_points.len() < 3 {
            warnings.push("Consider adding more bullet points".to_string());
        }
        for (i, bullet) in draft.bullet_points.iter().enumerate() {
            if bullet.len() > guidelines.bullet_max_length {
                warnings.push(format!("Bullet point {} is too long", i + 1));
            }
        }

        if draft.description.is_empty() {
            errors.push("Description is required".to_string());
        } else if draft.description.len() < 100 {
            warnings.push("Description is quite short".to_string());
        }

        if draft.keywords.len() < 3 {
            warnings.push("Consider adding more keywords".to_string());
        }

        // Ten compliance checks, warnings weighted at half an error.
        let total_checks = 10.0;
        let failed = errors.len() as f64 + warnings.len() as f64 * 0.5;
        let compliance_score = ((total_checks - failed) / total_checks * 100.0).max(0.0);

        ListingValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
            compliance_score,
        }
    }

    /// Blends guideline compliance (40%) with content quality (60%) into
    /// the 0-100 confidence score attached to the result
    fn confidence(draft: &ListingDraft, validation: &ListingValidation) -> f64 {
        let title_quality = (draft.title.len() as f64 * 2.0).min(100.0);
        let bullet_quality = (draft.bullet_points.len() as f64 * 20.0).min(100.0);
        let description_quality = (draft.description.len() as f64 / 5.0).min(100.0);
        let keyword_quality = (draft.keywords.len() as f64 * 25.0).min(100.0);
        let content_score =
            (title_quality + bullet_quality + description_quality + keyword_quality) / 4.0;

        (validation.compliance_score * 0.4 + content_score * 0.6).min(100.0)
    }
}

#[async_trait]
impl Agent for ListingGeneratorAgent {
    async fn initialize(&self) -> Result<()> {
        debug!(
            marketplaces = self.guidelines.len(),
            "Listing generator ready"
        );
        Ok(())
    }

    async fn execute(&self, ctx: TaskContext) -> Result<TaskOutput> {
        let input = ctx.input();
        let product = input
            .get("product")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let marketplace = input
            .get("marketplace")
            .and_then(Value::as_str)
            .unwrap_or("amazon")
            .to_string();
        let language = input
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or("en")
            .to_string();

        ctx.report_progress(10, "Analyzing product data").await;
        // validate() guarantees the marketplace key exists.
        let guidelines = &self.guidelines[&marketplace];
        let draft = Self::compose(&product, guidelines);

        ctx.report_progress(70, "Validating generated content").await;
        let validation = Self::validate_draft(&draft, guidelines);

        ctx.report_progress(90, "Finalizing listing").await;
        let confidence = Self::confidence(&draft, &validation);

        info!(
            task_id = %ctx.task_id(),
            marketplace = %marketplace,
            confidence,
            "Listing generated"
        );

        let mut result = Map::new();
        result.insert("listing_content".into(), json!(draft));
        result.insert("validation".into(), json!(validation));
        result.insert("marketplace".into(), json!(marketplace));
        result.insert("language".into(), json!(language));
        result.insert("confidence_score".into(), json!(confidence));
        Ok(TaskOutput::with_confidence(result, confidence))
    }

    fn validate(&self, input: &Map<String, Value>) -> Vec<String> {
        let mut errors = Vec::new();

        match input.get("product").and_then(Value::as_object) {
            None => errors.push("Product data is required".to_string()),
            Some(product) => {
                if str_field(product, "title").is_empty() {
                    errors.push("Product title is required".to_string());
                }
                if str_field(product, "description").is_empty() {
                    errors.push("Product description is required".to_string());
                }
                if str_field(product, "category").is_empty() {
                    errors.push("Product category is required".to_string());
                }
            }
        }

        if let Some(marketplace) = input.get("marketplace").and_then(Value::as_str) {
            if !self.guidelines.contains_key(marketplace) {
                errors.push(format!("Unsupported marketplace: {marketplace}"));
            }
        }

        let language = input
            .get("language")
            .and_then(Value::as_str)
            .unwrap_or("en");
        if !self.supported_languages.iter().any(|l| l == language) {
            errors.push(format!("Unsupported language: {language}"));
        }

        errors
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate(text: &str, max_length: usize) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_length.saturating_sub(3)).collect();
    format!("{kept}...")
}
