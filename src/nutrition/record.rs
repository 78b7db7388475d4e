//! The fixed-schema nutrition record and its sub-sections.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared maximum lengths (in characters) of bounded text fields.
pub mod limits {
    pub const DISH_NAME: usize = 255;
    pub const CUISINE_TYPE: usize = 100;
    pub const CONFIDENCE_LEVEL: usize = 20;
    pub const SERVING_SIZE: usize = 100;
    pub const PORTION_DESCRIPTION: usize = 255;
    pub const HEALTH_GRADE: usize = 10;
    pub const NUTRITION_BALANCE: usize = 100;
    pub const OVERALL_ASSESSMENT: usize = 1000;
    pub const PORTION_RECOMMENDATIONS: usize = 500;
    pub const COOKING_METHOD: usize = 100;
    pub const LANGUAGE: usize = 10;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DishIdentity {
    pub dish_name: Option<String>,
    pub cuisine_type: Option<String>,
    pub confidence_level: Option<String>,
    pub alternative_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServingInfo {
    pub serving_size: Option<String>,
    pub estimated_weight_grams: Option<f64>,
    pub portion_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionFacts {
    pub calories: Option<i64>,
    pub protein_g: Option<f64>,
    pub carbohydrates_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub fiber_g: Option<f64>,
    pub sugar_g: Option<f64>,
    pub sodium_mg: Option<f64>,
    pub vitamins: Vec<String>,
    pub minerals: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthAnalysis {
    /// 1–10 score from the vision model.
    pub health_score: Option<i64>,
    pub health_grade: Option<String>,
    pub nutrition_balance: Option<String>,
    pub health_benefits: Vec<String>,
    pub health_concerns: Vec<String>,
    pub overall_assessment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietaryInfo {
    pub is_vegetarian: Option<bool>,
    pub is_vegan: Option<bool>,
    pub is_gluten_free: Option<bool>,
    pub is_dairy_free: Option<bool>,
    pub is_keto_friendly: Option<bool>,
    pub is_diabetic_friendly: Option<bool>,
    pub allergens: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Improvements {
    pub healthier_alternatives: Vec<String>,
    pub portion_recommendations: Option<String>,
    pub cooking_tips: Vec<String>,
    pub nutritional_additions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngredientBreakdown {
    pub main_ingredients: Vec<String>,
    pub spices_and_seasonings: Vec<String>,
    pub cooking_method: Option<String>,
}

/// Every normalized field, grouped by the sub-section it came from.
///
/// Serializes flat: section groupings do not appear in the JSON form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedAnalysis {
    #[serde(flatten)]
    pub dish: DishIdentity,
    #[serde(flatten)]
    pub serving: ServingInfo,
    #[serde(flatten)]
    pub nutrition: NutritionFacts,
    #[serde(flatten)]
    pub health: HealthAnalysis,
    #[serde(flatten)]
    pub dietary: DietaryInfo,
    #[serde(flatten)]
    pub improvements: Improvements,
    #[serde(flatten)]
    pub ingredients: IngredientBreakdown,
    pub language: Option<String>,
}

/// Where an uploaded meal image lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub public_url: String,
    pub storage_ref: String,
}

/// A persisted nutrition analysis for one image of one user.
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub image: ImageRef,
    /// Analyzer output exactly as received, kept for audit.
    pub raw_analysis: String,
    #[serde(flatten)]
    pub analysis: NormalizedAnalysis,
    pub created_at: DateTime<Utc>,
}

impl NutritionRecord {
    pub fn new(
        user_id: Uuid,
        image: ImageRef,
        raw_analysis: impl Into<String>,
        analysis: NormalizedAnalysis,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            image,
            raw_analysis: raw_analysis.into(),
            analysis,
            created_at: Utc::now(),
        }
    }
}
