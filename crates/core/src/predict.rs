//! Validation of model prediction responses.
//!
//! A connection test only passes when the model answered with content the
//! assistant can display. Both OpenAI-style `choices` and Anthropic-style
//! `content` payloads are accepted.

use crate::repositories::dto::ModelPredictResponse;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("Prediction response has no inference_results")]
    MissingInferenceResults,

    #[error("Prediction failed: status code is {0}")]
    UnexpectedStatus(u16),

    #[error("Prediction response has no output")]
    MissingOutput,

    #[error("Prediction output has no dataAsMap")]
    MissingDataAsMap,

    #[error("Prediction response does not contain valid content")]
    NoContent,
}

/// Check that a prediction response carries a usable answer.
pub fn validate(response: &ModelPredictResponse) -> Result<(), PredictionError> {
    let result = response
        .inference_results
        .first()
        .ok_or(PredictionError::MissingInferenceResults)?;

    if let Some(status) = result.status_code {
        if status != 200 {
            return Err(PredictionError::UnexpectedStatus(status));
        }
    }

    let output = result.output.first().ok_or(PredictionError::MissingOutput)?;
    let data = output
        .data_as_map
        .as_ref()
        .ok_or(PredictionError::MissingDataAsMap)?;

    if has_choices_content(data) || has_text_content(data) {
        Ok(())
    } else {
        Err(PredictionError::NoContent)
    }
}

fn has_choices_content(data: &Value) -> bool {
    data.get("choices")
        .and_then(Value::as_array)
        .is_some_and(|choices| {
            choices.iter().any(|choice| {
                choice
                    .pointer("/message/content")
                    .is_some_and(Value::is_string)
            })
        })
}

fn has_text_content(data: &Value) -> bool {
    data.get("content")
        .and_then(Value::as_array)
        .is_some_and(|blocks| {
            blocks
                .iter()
                .any(|block| block.get("text").is_some_and(Value::is_string))
        })
}
