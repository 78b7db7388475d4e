//! Maps the vision model's loosely-structured analysis into a
//! [`NormalizedAnalysis`].
//!
//! Each sub-section is extracted independently. A malformed sub-section is
//! logged and left at its defaults; the others are unaffected, and
//! normalization itself never fails.

use serde_json::{Map, Value};
use tracing::warn;

use super::coerce;
use super::record::{
    DietaryInfo, DishIdentity, HealthAnalysis, Improvements, IngredientBreakdown,
    NormalizedAnalysis, NutritionFacts, ServingInfo, limits,
};

/// Result of normalizing one analysis payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The image shows food; the record is ready to persist.
    Food(NormalizedAnalysis),
    /// The model said the image is not food. Nothing is persisted.
    NotFood(NotFood),
}

/// What the model saw instead of food.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotFood {
    pub description: Option<String>,
    pub message: Option<String>,
}

/// A sub-section whose value had the wrong shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("section {section} should be an object, got {found}")]
pub struct SectionFault {
    pub section: &'static str,
    pub found: &'static str,
}

/// One named group of the analysis payload.
trait Section: Default + Sized {
    const KEY: &'static str;

    fn extract(fields: &Map<String, Value>) -> Self;

    fn from_value(value: &Value) -> Result<Self, SectionFault> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(fields) => Ok(Self::extract(fields)),
            other => Err(SectionFault {
                section: Self::KEY,
                found: kind_name(other),
            }),
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Fault boundary around a single section.
fn section<S: Section>(payload: &Map<String, Value>) -> S {
    let Some(value) = payload.get(S::KEY) else {
        return S::default();
    };
    S::from_value(value).unwrap_or_else(|fault| {
        warn!(section = S::KEY, %fault, "Malformed analysis section, using defaults");
        S::default()
    })
}

/// Ingredient-style list: objects contribute their `name`, scalars their text.
fn names(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Null => None,
                Value::Object(obj) => match obj.get("name") {
                    Some(name) => coerce::string_list(Some(name)).into_iter().next(),
                    None => Some(item.to_string()),
                },
                other => coerce::string_list(Some(other)).into_iter().next(),
            })
            .collect(),
        other => coerce::string_list(other),
    }
}

impl Section for DishIdentity {
    const KEY: &'static str = "dish_identification";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            dish_name: coerce::text(f.get("dish_name"), "dish_name", limits::DISH_NAME),
            cuisine_type: coerce::text(f.get("cuisine_type"), "cuisine_type", limits::CUISINE_TYPE),
            confidence_level: coerce::text(
                f.get("confidence_level"),
                "confidence_level",
                limits::CONFIDENCE_LEVEL,
            ),
            alternative_names: coerce::string_list(f.get("alternative_names")),
        }
    }
}

impl Section for ServingInfo {
    const KEY: &'static str = "serving_info";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            serving_size: coerce::text(f.get("serving_size"), "serving_size", limits::SERVING_SIZE),
            estimated_weight_grams: coerce::number(f.get("estimated_weight_grams")),
            portion_description: coerce::text(
                f.get("portion_description"),
                "portion_description",
                limits::PORTION_DESCRIPTION,
            ),
        }
    }
}

impl Section for NutritionFacts {
    const KEY: &'static str = "nutrition_facts";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            calories: coerce::integer(f.get("calories")),
            protein_g: coerce::number(f.get("protein_g")),
            carbohydrates_g: coerce::number(f.get("carbohydrates_g")),
            fat_g: coerce::number(f.get("fat_g")),
            fiber_g: coerce::number(f.get("fiber_g")),
            sugar_g: coerce::number(f.get("sugar_g")),
            sodium_mg: coerce::number(f.get("sodium_mg")),
            vitamins: coerce::string_list(f.get("vitamins")),
            minerals: coerce::string_list(f.get("minerals")),
        }
    }
}

impl Section for HealthAnalysis {
    const KEY: &'static str = "health_analysis";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            health_score: coerce::integer(f.get("health_score")),
            health_grade: coerce::text(f.get("health_grade"), "health_grade", limits::HEALTH_GRADE),
            nutrition_balance: coerce::text(
                f.get("nutrition_balance"),
                "nutrition_balance",
                limits::NUTRITION_BALANCE,
            ),
            health_benefits: coerce::string_list(f.get("health_benefits")),
            health_concerns: coerce::string_list(f.get("health_concerns")),
            overall_assessment: coerce::text(
                f.get("overall_assessment"),
                "overall_assessment",
                limits::OVERALL_ASSESSMENT,
            ),
        }
    }
}

impl Section for DietaryInfo {
    const KEY: &'static str = "dietary_info";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            is_vegetarian: coerce::flag(f.get("is_vegetarian")),
            is_vegan: coerce::flag(f.get("is_vegan")),
            is_gluten_free: coerce::flag(f.get("is_gluten_free")),
            is_dairy_free: coerce::flag(f.get("is_dairy_free")),
            is_keto_friendly: coerce::flag(f.get("is_keto_friendly")),
            is_diabetic_friendly: coerce::flag(f.get("is_diabetic_friendly")),
            allergens: coerce::string_list(f.get("allergens")),
        }
    }
}

impl Section for Improvements {
    const KEY: &'static str = "improvement_suggestions";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            healthier_alternatives: coerce::string_list(f.get("healthier_alternatives")),
            portion_recommendations: coerce::text(
                f.get("portion_recommendations"),
                "portion_recommendations",
                limits::PORTION_RECOMMENDATIONS,
            ),
            cooking_tips: coerce::string_list(f.get("cooking_tips")),
            nutritional_additions: coerce::string_list(f.get("nutritional_additions")),
        }
    }
}

impl Section for IngredientBreakdown {
    const KEY: &'static str = "ingredient_breakdown";

    fn extract(f: &Map<String, Value>) -> Self {
        Self {
            main_ingredients: names(f.get("main_ingredients")),
            spices_and_seasonings: names(f.get("spices_and_seasonings")),
            cooking_method: coerce::text(
                f.get("cooking_method"),
                "cooking_method",
                limits::COOKING_METHOD,
            ),
        }
    }
}

/// Normalize an analysis payload.
///
/// `is_food: false` (in any boolean-ish spelling) short-circuits to
/// [`Normalized::NotFood`]; an absent flag counts as food.
pub fn normalize(payload: &Value) -> Normalized {
    let empty = Map::new();
    let root = match payload {
        Value::Object(root) => root,
        other => {
            warn!(found = kind_name(other), "Analysis payload is not an object");
            &empty
        }
    };

    if coerce::flag(root.get("is_food")) == Some(false) {
        return Normalized::NotFood(NotFood {
            description: coerce::text(root.get("image_description"), "image_description", 500),
            message: coerce::text(root.get("message"), "message", 1000),
        });
    }

    Normalized::Food(NormalizedAnalysis {
        dish: section(root),
        serving: section(root),
        nutrition: section(root),
        health: section(root),
        dietary: section(root),
        improvements: section(root),
        ingredients: section(root),
        language: coerce::text(root.get("language"), "language", limits::LANGUAGE),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn full_payload() -> Value {
        json!({
            "is_food": true,
            "language": "ta",
            "dish_identification": {
                "dish_name": "Masala Dosa",
                "cuisine_type": "South Indian",
                "confidence_level": "high",
                "alternative_names": ["Dosai", "Masala Dosai"]
            },
            "serving_info": {
                "serving_size": "1 dosa",
                "estimated_weight_grams": 180.5,
                "portion_description": "One large dosa with potato filling"
            },
            "nutrition_facts": {
                "calories": 387,
                "protein_g": 8.2,
                "carbohydrates_g": 52.0,
                "fat_g": 16.5,
                "fiber_g": 4.1,
                "sugar_g": 2.3,
                "sodium_mg": 610.0,
                "vitamins": ["B6", "C"],
                "minerals": ["Iron", "Potassium"]
            },
            "health_analysis": {
                "health_score": 6,
                "health_grade": "B",
                "nutrition_balance": "carb heavy",
                "health_benefits": ["Fermented batter aids digestion"],
                "health_concerns": ["High oil content"],
                "overall_assessment": "A filling meal, moderate in fat."
            },
            "dietary_info": {
                "is_vegetarian": true,
                "is_vegan": false,
                "is_gluten_free": true,
                "is_dairy_free": false,
                "is_keto_friendly": false,
                "is_diabetic_friendly": false,
                "allergens": ["dairy"]
            },
            "improvement_suggestions": {
                "healthier_alternatives": ["Plain dosa", "Ragi dosa"],
                "portion_recommendations": "Half a dosa with extra sambar",
                "cooking_tips": ["Use less ghee"],
                "nutritional_additions": ["Sambar for protein"]
            },
            "ingredient_breakdown": {
                "main_ingredients": ["rice", "urad dal", "potato"],
                "spices_and_seasonings": ["mustard seeds", "turmeric"],
                "cooking_method": "griddle"
            }
        })
    }

    fn food(payload: &Value) -> NormalizedAnalysis {
        match normalize(payload) {
            Normalized::Food(analysis) => analysis,
            Normalized::NotFood(n) => panic!("expected food, got {n:?}"),
        }
    }

    #[test]
    fn full_payload_round_trips_every_value() {
        let a = food(&full_payload());

        assert_eq!(a.language.as_deref(), Some("ta"));
        assert_eq!(a.dish.dish_name.as_deref(), Some("Masala Dosa"));
        assert_eq!(a.dish.cuisine_type.as_deref(), Some("South Indian"));
        assert_eq!(a.dish.confidence_level.as_deref(), Some("high"));
        assert_eq!(a.dish.alternative_names, vec!["Dosai", "Masala Dosai"]);

        assert_eq!(a.serving.serving_size.as_deref(), Some("1 dosa"));
        assert_eq!(a.serving.estimated_weight_grams, Some(180.5));
        assert_eq!(
            a.serving.portion_description.as_deref(),
            Some("One large dosa with potato filling")
        );

        assert_eq!(a.nutrition.calories, Some(387));
        assert_eq!(a.nutrition.protein_g, Some(8.2));
        assert_eq!(a.nutrition.carbohydrates_g, Some(52.0));
        assert_eq!(a.nutrition.fat_g, Some(16.5));
        assert_eq!(a.nutrition.fiber_g, Some(4.1));
        assert_eq!(a.nutrition.sugar_g, Some(2.3));
        assert_eq!(a.nutrition.sodium_mg, Some(610.0));
        assert_eq!(a.nutrition.vitamins, vec!["B6", "C"]);
        assert_eq!(a.nutrition.minerals, vec!["Iron", "Potassium"]);

        assert_eq!(a.health.health_score, Some(6));
        assert_eq!(a.health.health_grade.as_deref(), Some("B"));
        assert_eq!(a.health.nutrition_balance.as_deref(), Some("carb heavy"));
        assert_eq!(a.health.health_benefits, vec!["Fermented batter aids digestion"]);
        assert_eq!(a.health.health_concerns, vec!["High oil content"]);
        assert_eq!(
            a.health.overall_assessment.as_deref(),
            Some("A filling meal, moderate in fat.")
        );

        assert_eq!(a.dietary.is_vegetarian, Some(true));
        assert_eq!(a.dietary.is_vegan, Some(false));
        assert_eq!(a.dietary.is_gluten_free, Some(true));
        assert_eq!(a.dietary.is_dairy_free, Some(false));
        assert_eq!(a.dietary.is_keto_friendly, Some(false));
        assert_eq!(a.dietary.is_diabetic_friendly, Some(false));
        assert_eq!(a.dietary.allergens, vec!["dairy"]);

        assert_eq!(a.improvements.healthier_alternatives, vec!["Plain dosa", "Ragi dosa"]);
        assert_eq!(
            a.improvements.portion_recommendations.as_deref(),
            Some("Half a dosa with extra sambar")
        );
        assert_eq!(a.improvements.cooking_tips, vec!["Use less ghee"]);
        assert_eq!(a.improvements.nutritional_additions, vec!["Sambar for protein"]);

        assert_eq!(a.ingredients.main_ingredients, vec!["rice", "urad dal", "potato"]);
        assert_eq!(a.ingredients.spices_and_seasonings, vec!["mustard seeds", "turmeric"]);
        assert_eq!(a.ingredients.cooking_method.as_deref(), Some("griddle"));
    }

    #[test]
    fn empty_object_is_fully_defaulted() {
        assert_eq!(food(&json!({})), NormalizedAnalysis::default());
    }

    #[test]
    fn non_object_payload_is_fully_defaulted() {
        assert_eq!(food(&json!("nonsense")), NormalizedAnalysis::default());
        assert_eq!(food(&json!([1, 2, 3])), NormalizedAnalysis::default());
    }

    #[test]
    fn explicit_false_short_circuits() {
        let result = normalize(&json!({
            "is_food": false,
            "image_description": "a chair",
            "message": "please send food",
            "dish_identification": {"dish_name": "ignored"}
        }));
        assert_eq!(
            result,
            Normalized::NotFood(NotFood {
                description: Some("a chair".into()),
                message: Some("please send food".into()),
            })
        );
    }

    #[test]
    fn string_false_short_circuits() {
        assert!(matches!(
            normalize(&json!({"is_food": "no"})),
            Normalized::NotFood(_)
        ));
    }

    #[test]
    fn null_is_food_counts_as_food() {
        assert!(matches!(normalize(&json!({"is_food": null})), Normalized::Food(_)));
    }

    #[test]
    fn malformed_section_keeps_other_sections() {
        let mut payload = full_payload();
        payload["nutrition_facts"] = json!("lots of calories");
        payload["dietary_info"] = json!([true, false]);

        let a = food(&payload);
        assert_eq!(a.nutrition, NutritionFacts::default());
        assert_eq!(a.dietary, DietaryInfo::default());
        assert_eq!(a.dish.dish_name.as_deref(), Some("Masala Dosa"));
        assert_eq!(a.health.health_score, Some(6));
        assert_eq!(a.ingredients.cooking_method.as_deref(), Some("griddle"));
    }

    #[test]
    fn stringly_typed_values_are_coerced() {
        let a = food(&json!({
            "nutrition_facts": {"calories": "450", "protein_g": "12.5", "fat_g": "lots"},
            "health_analysis": {"health_score": "3"},
            "dietary_info": {"is_vegan": "YES", "is_vegetarian": "nope"},
            "improvement_suggestions": {"cooking_tips": "Bake instead of fry"}
        }));
        assert_eq!(a.nutrition.calories, Some(450));
        assert_eq!(a.nutrition.protein_g, Some(12.5));
        assert_eq!(a.nutrition.fat_g, None);
        assert_eq!(a.health.health_score, Some(3));
        assert_eq!(a.dietary.is_vegan, Some(true));
        assert_eq!(a.dietary.is_vegetarian, Some(false));
        assert_eq!(a.dietary.is_gluten_free, None);
        assert_eq!(a.improvements.cooking_tips, vec!["Bake instead of fry"]);
    }

    #[test]
    fn over_long_dish_name_truncated_to_limit() {
        let a = food(&json!({
            "dish_identification": {"dish_name": "a".repeat(limits::DISH_NAME + 40)}
        }));
        assert_eq!(
            a.dish.dish_name.map(|n| n.chars().count()),
            Some(limits::DISH_NAME)
        );
    }

    #[test]
    fn ingredient_objects_contribute_names() {
        let a = food(&json!({
            "ingredient_breakdown": {
                "main_ingredients": [
                    {"name": "rice", "quantity": "1 cup"},
                    "lentils",
                    null,
                    {"quantity": "2 tbsp"}
                ]
            }
        }));
        assert_eq!(
            a.ingredients.main_ingredients,
            vec!["rice", "lentils", r#"{"quantity":"2 tbsp"}"#]
        );
    }
}
