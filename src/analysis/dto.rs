use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TextAnalysisRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct VoiceAnalysisRequest {
    pub file_url: String,
    pub duration_seconds: u32,
}

#[derive(Debug, Deserialize)]
pub struct ImageAnalysisRequest {
    pub file_url: String,
    #[serde(default)]
    pub size_bytes: Option<u64>, // as reported by the chat platform, if known
}
