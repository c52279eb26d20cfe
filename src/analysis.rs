//! AI meal analysis: request/response types and the photo workflow.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::ImageStore;
use crate::models::{Confidence, MealSource, NewMeal, ValidationError, MIN_DESCRIPTION_LEN};

/// Payload sent to the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
  pub user_id: Uuid,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl AnalysisRequest {
  /// Photo analysis with an optional hint.
  pub fn with_image(user_id: Uuid, image_url: String, description: Option<String>) -> Self {
    Self {
      user_id,
      image_url: Some(image_url),
      description: description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty()),
    }
  }

  /// Text-only analysis; the description must carry enough detail.
  pub fn text_only(user_id: Uuid, description: &str) -> Result<Self, ValidationError> {
    let description = description.trim();
    if description.chars().count() < MIN_DESCRIPTION_LEN {
      return Err(ValidationError::DescriptionTooShort {
        min: MIN_DESCRIPTION_LEN,
      });
    }
    Ok(Self {
      user_id,
      image_url: None,
      description: Some(description.to_string()),
    })
  }
}

/// Macro estimate returned by the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisResponse {
  pub calories: u32,
  pub protein: f64,
  pub carbs: f64,
  pub fat: f64,
  pub confidence: Confidence,
  #[serde(default)]
  pub meal_description: Option<String>,
  #[serde(default)]
  pub ai_model_used: Option<String>,
}

impl AnalysisResponse {
  /// Turn the estimate into a meal draft tagged as AI-sourced.
  pub fn into_meal(self, image_url: Option<String>, description: Option<String>) -> NewMeal {
    NewMeal {
      calories: self.calories,
      protein: self.protein,
      carbs: self.carbs,
      fat: self.fat,
      image_url,
      source: MealSource::Ai,
      ai_model: self.ai_model_used,
      description: description.filter(|d| !d.trim().is_empty()),
      meal_description: self.meal_description,
      confidence: Some(self.confidence),
      created_at: None,
    }
  }
}

/// External macro estimator.
#[async_trait]
pub trait MealAnalyzer: Send + Sync {
  async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse>;
}

/// Result of the photo workflow
#[derive(Debug, Clone)]
pub struct PhotoAnalysis {
  pub analysis: AnalysisResponse,
  pub image_url: String,
}

/// Upload a meal photo, then analyze it by public URL.
pub async fn analyze_photo(
  analyzer: &dyn MealAnalyzer,
  images: &dyn ImageStore,
  user_id: Uuid,
  image: Vec<u8>,
  description: Option<String>,
) -> Result<PhotoAnalysis> {
  if image.is_empty() {
    return Err(eyre!("Image is empty"));
  }

  info!(step = "uploading", bytes = image.len(), "analyzing meal photo");
  let path = format!("{}/{}.jpg", user_id, Utc::now().timestamp_millis());
  let path = images.upload(&path, image, "image/jpeg").await?;
  let image_url = images.public_url(&path)?;

  info!(step = "analyzing", %image_url, "image uploaded");
  let request = AnalysisRequest::with_image(user_id, image_url.clone(), description);
  let analysis = analyzer.analyze(&request).await.map_err(|e| {
    warn!(error = %e, "meal analysis failed");
    e
  })?;

  info!(
    step = "done",
    calories = analysis.calories,
    confidence = analysis.confidence.as_str(),
    "meal photo analyzed"
  );
  Ok(PhotoAnalysis {
    analysis,
    image_url,
  })
}

/// Estimate macros from a description alone.
pub async fn analyze_text(
  analyzer: &dyn MealAnalyzer,
  user_id: Uuid,
  description: &str,
) -> Result<AnalysisResponse> {
  let request = AnalysisRequest::text_only(user_id, description)?;

  info!(step = "estimating", "analyzing meal description");
  let analysis = analyzer.analyze(&request).await?;
  info!(step = "done", calories = analysis.calories, "meal description analyzed");
  Ok(analysis)
}
