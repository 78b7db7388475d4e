//! Chat-friendly rendering of a normalized analysis.

use std::fmt::Write;

use super::record::NormalizedAnalysis;

/// Format a number without a trailing `.0`.
fn num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

fn yes_no(label: &str, value: Option<bool>) -> Option<String> {
    value.map(|v| format!("{} {label}", if v { "✅" } else { "❌" }))
}

/// Render the analysis as a compact, language-neutral message.
///
/// Only populated fields appear; labels are emoji so the model-provided
/// text carries the language.
pub fn analysis_message(a: &NormalizedAnalysis) -> String {
    let mut out = String::new();

    if let Some(name) = &a.dish.dish_name {
        let _ = write!(out, "🍽️ *{name}*");
        if let Some(cuisine) = &a.dish.cuisine_type {
            let _ = write!(out, " ({cuisine})");
        }
        out.push('\n');
    }
    if let Some(serving) = &a.serving.serving_size {
        let _ = writeln!(out, "🥄 {serving}");
    }

    let n = &a.nutrition;
    if let Some(calories) = n.calories {
        let _ = writeln!(out, "🔥 {calories} kcal");
    }
    let macros: Vec<String> = [
        ("💪", n.protein_g, "g"),
        ("🍞", n.carbohydrates_g, "g"),
        ("🧈", n.fat_g, "g"),
        ("🌾", n.fiber_g, "g"),
        ("🍬", n.sugar_g, "g"),
        ("🧂", n.sodium_mg, "mg"),
    ]
    .into_iter()
    .filter_map(|(icon, value, unit)| value.map(|v| format!("{icon} {}{unit}", num(v))))
    .collect();
    if !macros.is_empty() {
        let _ = writeln!(out, "{}", macros.join("  "));
    }

    if let Some(score) = a.health.health_score {
        let _ = write!(out, "❤️ {score}/10");
        if let Some(grade) = &a.health.health_grade {
            let _ = write!(out, " ({grade})");
        }
        out.push('\n');
    }
    if let Some(assessment) = &a.health.overall_assessment {
        let _ = writeln!(out, "{assessment}");
    }

    let dietary: Vec<String> = [
        yes_no("veg", a.dietary.is_vegetarian),
        yes_no("vegan", a.dietary.is_vegan),
        yes_no("gluten-free", a.dietary.is_gluten_free),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !dietary.is_empty() {
        let _ = writeln!(out, "{}", dietary.join("  "));
    }

    for benefit in &a.health.health_benefits {
        let _ = writeln!(out, "👍 {benefit}");
    }
    for concern in &a.health.health_concerns {
        let _ = writeln!(out, "⚠️ {concern}");
    }
    for alternative in &a.improvements.healthier_alternatives {
        let _ = writeln!(out, "💡 {alternative}");
    }

    out.trim_end().to_string()
}
