/// Module to read request payloads into tensors and shape the JSON responses.
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};

/// Number of features the model accepts.
pub const FEATURES: usize = 100;

/// Number of prediction values returned to the caller.
pub const PREDICTION_LEN: usize = 10;

pub const FEATURE_COUNT_MESSAGE: &str = "Input data must have 100 features";

/// Load duration used when the caller gives none.
pub const DEFAULT_LOAD_SECS: u64 = 10;

#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    #[serde(default)]
    pub data: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub prediction: Vec<f32>,
    pub status: String,
    pub pod_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cpu_percent: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_free_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_total_bytes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadParams {
    pub duration: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoadResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iters: Option<u64>,
    pub pod_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Parse a `/predict` body and convert the features to an `f32` column vector.
///
/// The length check runs before any element is inspected so a short or long
/// payload always gets the fixed feature-count message.
pub fn read_features(body: &[u8], device: &Device) -> HarnessResult<Tensor> {
    let request: PredictRequest = if body.is_empty() {
        PredictRequest::default()
    } else {
        serde_json::from_slice(body)
            .map_err(|e| HarnessError::Validation(format!("invalid JSON body: {e}")))?
    };
    if request.data.len() != FEATURES {
        return Err(HarnessError::Validation(FEATURE_COUNT_MESSAGE.to_string()));
    }
    let values = request
        .data
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| HarnessError::Validation(format!("feature {i} is not a number")))
        })
        .collect::<HarnessResult<Vec<f32>>>()?;
    Ok(Tensor::from_vec(values, (FEATURES, 1), device)?)
}

/// Copy a model output back to the host and keep the leading values.
pub fn write_prediction(output: &Tensor) -> HarnessResult<Vec<f32>> {
    let mut values = output
        .flatten_all()?
        .to_dtype(DType::F32)?
        .to_vec1::<f32>()?;
    values.truncate(PREDICTION_LEN);
    Ok(values)
}

/// Parse the `duration` query parameter in whole seconds.
pub fn read_duration(params: &LoadParams) -> HarnessResult<u64> {
    match params.duration.as_deref().map(str::trim) {
        None | Some("") => Ok(DEFAULT_LOAD_SECS),
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            HarnessError::Validation(format!(
                "duration must be a non-negative whole number of seconds, got {raw:?}"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(len: usize) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({ "data": vec![1.0; len] })).unwrap()
    }

    #[test]
    fn reads_column_vector() {
        let t = read_features(&body(FEATURES), &Device::Cpu).unwrap();
        assert_eq!(t.dims(), &[FEATURES, 1]);
        assert_eq!(t.dtype(), DType::F32);
    }

    #[test]
    fn rejects_wrong_lengths() {
        for len in [0, 99, 101] {
            let err = read_features(&body(len), &Device::Cpu).unwrap_err();
            assert!(
                matches!(err, HarnessError::Validation(ref m) if m == FEATURE_COUNT_MESSAGE),
                "len {len}: {err:?}"
            );
        }
    }

    #[test]
    fn missing_data_and_empty_body_are_feature_count_errors() {
        for raw in [&b"{}"[..], &b""[..]] {
            let err = read_features(raw, &Device::Cpu).unwrap_err();
            assert_eq!(err.to_string(), FEATURE_COUNT_MESSAGE);
        }
    }

    #[test]
    fn rejects_non_numeric_feature() {
        let mut data = vec![serde_json::json!(0.5); FEATURES];
        data[7] = serde_json::json!("x");
        let raw = serde_json::to_vec(&serde_json::json!({ "data": data })).unwrap();
        let err = read_features(&raw, &Device::Cpu).unwrap_err();
        assert_eq!(err.to_string(), "feature 7 is not a number");
    }

    #[test]
    fn rejects_malformed_json() {
        let err = read_features(b"{not json", &Device::Cpu).unwrap_err();
        assert!(matches!(err, HarnessError::Validation(_)));
    }

    #[test]
    fn prediction_is_truncated() {
        let t = Tensor::arange(0f32, 100f32, &Device::Cpu)
            .unwrap()
            .reshape((100, 1))
            .unwrap();
        let values = write_prediction(&t).unwrap();
        assert_eq!(values, (0..10).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn duration_defaults_and_parses() {
        assert_eq!(read_duration(&LoadParams::default()).unwrap(), DEFAULT_LOAD_SECS);
        let params = LoadParams {
            duration: Some("3".into()),
        };
        assert_eq!(read_duration(&params).unwrap(), 3);
        for bad in ["-1", "abc", "1.5"] {
            let params = LoadParams {
                duration: Some(bad.into()),
            };
            assert!(matches!(
                read_duration(&params),
                Err(HarnessError::Validation(_))
            ));
        }
    }
}
