use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoodItem {
    pub name: String,
    pub portion: String,
    pub calories: u32,
}

/// A food verdict with canonical calorie values. `total_calories` is the
/// upstream total after normalization, never a re-sum of `items`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FoodEstimate {
    pub items: Vec<FoodItem>,
    pub total_calories: u32,
    pub confidence: String,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Set for photo analyses; never as reliable as a text estimate.
    pub approximate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    NoFoodDetected { message: String },
    FoodDetected(FoodEstimate),
}
