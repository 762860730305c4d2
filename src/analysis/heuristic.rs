//! Offline estimate used when the reasoning service fails or answers
//! something unparseable.
//!
//! Rules are evaluated in table order and the first match wins, so table
//! order is part of the behaviour: the single-keyword dishes come first,
//! then the two-ingredient combinations. Exactly one item is ever returned.

use tracing::debug;

use super::types::{AnalysisResult, FoodEstimate, FoodItem};

pub const GENERIC_CALORIES: u32 = 250;
const GENERIC_PORTION: &str = "стандартная порция";
const CONFIDENCE: &str = "средняя (база данных)";
const REASONING: &str = "Определено из базы популярных блюд";
const NOT_FOOD_MESSAGE: &str = "Сообщение не связано с едой или напитками";

enum Predicate {
    Contains(&'static str),
    ContainsAll(&'static [&'static str]),
}

impl Predicate {
    fn matches(&self, text: &str) -> bool {
        match self {
            Predicate::Contains(keyword) => text.contains(keyword),
            Predicate::ContainsAll(keywords) => keywords.iter().all(|k| text.contains(k)),
        }
    }
}

struct Rule {
    when: Predicate,
    name: &'static str,
    portion: &'static str,
    calories: u32,
}

const fn dish(keyword: &'static str, name: &'static str, portion: &'static str, calories: u32) -> Rule {
    Rule {
        when: Predicate::Contains(keyword),
        name,
        portion,
        calories,
    }
}

const fn combo(
    keywords: &'static [&'static str],
    name: &'static str,
    portion: &'static str,
    calories: u32,
) -> Rule {
    Rule {
        when: Predicate::ContainsAll(keywords),
        name,
        portion,
        calories,
    }
}

const RULES: &[Rule] = &[
    dish("борщ", "борщ", "300мл", 120),
    dish("суп", "суп", "300мл", 100),
    dish("шаурма", "шаурма", "1шт", 450),
    dish("бургер", "бургер", "1шт", 540),
    dish("пицца", "пицца", "1 кусок", 285),
    dish("плов", "плов", "200г", 350),
    dish("каша", "каша", "200г", 150),
    dish("салат", "салат", "150г", 80),
    dish("котлета", "котлета", "1шт", 250),
    dish("омлет", "омлет", "2 яйца", 200),
    dish("макароны", "макароны", "200г", 280),
    dish("рис", "рис", "200г", 260),
    dish("курица", "курица", "150г", 248),
    dish("мясо", "мясо", "150г", 280),
    dish("рыба", "рыба", "150г", 206),
    dish("яйцо", "яйца", "2шт", 140),
    dish("хлеб", "хлеб", "2 куска", 160),
    dish("кофе", "кофе", "200мл", 25),
    dish("чай", "чай", "200мл", 5),
    dish("молоко", "молоко", "200мл", 120),
    dish("яблоко", "яблоко", "1шт", 95),
    dish("банан", "банан", "1шт", 105),
    dish("картошка", "картофель", "200г", 160),
    dish("картофель", "картофель", "200г", 160),
    combo(&["макароны", "сыр"], "макароны с сыром", "250г", 350),
    combo(&["рис", "курица"], "рис с курицей", "300г", 400),
];

/// Greetings and small talk; consulted only once no dish rule matched.
const SMALL_TALK: &[&str] = &[
    "привет",
    "здравствуй",
    "как дела",
    "спасибо",
    "пока",
    "погода",
    "время",
    "работа",
    "учеба",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl HeuristicEstimator {
    pub fn estimate(&self, description: &str) -> AnalysisResult {
        let text = description.to_lowercase();

        if let Some(rule) = RULES.iter().find(|r| r.when.matches(&text)) {
            debug!(dish = rule.name, calories = rule.calories, "heuristic dish match");
            return single_item(rule.name.to_string(), rule.portion, rule.calories);
        }

        if SMALL_TALK.iter().any(|w| text.contains(w)) {
            debug!("heuristic classified input as small talk");
            return AnalysisResult::NoFoodDetected {
                message: NOT_FOOD_MESSAGE.to_string(),
            };
        }

        debug!(calories = GENERIC_CALORIES, "heuristic generic estimate");
        single_item(description.trim().to_string(), GENERIC_PORTION, GENERIC_CALORIES)
    }
}

fn single_item(name: String, portion: &str, calories: u32) -> AnalysisResult {
    AnalysisResult::FoodDetected(FoodEstimate {
        items: vec![FoodItem {
            name,
            portion: portion.to_string(),
            calories,
        }],
        total_calories: calories,
        confidence: CONFIDENCE.to_string(),
        reasoning: REASONING.to_string(),
        comment: None,
        approximate: false,
    })
}
