use std::path::PathBuf;

/// CLI configuration, loaded from `MEMORA_*` environment variables.
pub struct Config {
    /// Device path for the `user` (patient-facing) camera.
    pub front_device: String,
    /// Device path for the `environment` (visitor-facing) camera.
    pub rear_device: String,
    /// Path to the SeetaFace model file.
    pub model_path: PathBuf,
    /// Generic `{action, user_id, data}` webhook endpoint.
    pub api_url: String,
    /// Recognition webhook endpoint.
    pub recognize_url: String,
    /// Conversation-starter webhook endpoint.
    pub conversation_url: String,
    /// Account identifier sent with every API call.
    pub user_id: String,
    /// Patient whose circle of people is matched against.
    pub patient_id: i64,
    /// Milliseconds between detector invocations.
    pub poll_interval_ms: u64,
    /// Consecutive detections before a capture fires.
    pub stable_threshold: u32,
    /// Boxes averaged for overlay positions.
    pub smoothing_window: usize,
    /// Initial frames discarded for camera AGC/AE stabilization.
    pub warmup_frames: u32,
    /// JPEG quality for captured photos (1–100).
    pub jpeg_quality: u8,
    /// Seconds a recognition result stays on screen before scanning resumes.
    pub result_display_secs: u64,
    /// BCP-47 language tag passed to the conversation endpoint.
    pub language: String,
}

impl Config {
    /// Load configuration from `MEMORA_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_path = std::env::var("MEMORA_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| memora_core::seeta::default_model_path());

        let endpoints = memora_client::WebhookEndpoints::default();

        Self {
            front_device: std::env::var("MEMORA_FRONT_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            rear_device: std::env::var("MEMORA_REAR_DEVICE")
                .unwrap_or_else(|_| "/dev/video2".to_string()),
            model_path,
            api_url: std::env::var("MEMORA_API_URL").unwrap_or(endpoints.api_url),
            recognize_url: std::env::var("MEMORA_RECOGNIZE_URL").unwrap_or(endpoints.recognize_url),
            conversation_url: std::env::var("MEMORA_CONVERSATION_URL")
                .unwrap_or(endpoints.conversation_url),
            user_id: std::env::var("MEMORA_USER_ID").unwrap_or_else(|_| "local".to_string()),
            patient_id: env_i64("MEMORA_PATIENT_ID", 1),
            poll_interval_ms: env_u64("MEMORA_POLL_INTERVAL_MS", 200),
            stable_threshold: env_u32("MEMORA_STABLE_THRESHOLD", 5),
            smoothing_window: env_usize("MEMORA_SMOOTHING_WINDOW", 5),
            warmup_frames: env_u32("MEMORA_WARMUP_FRAMES", 4),
            jpeg_quality: env_u8("MEMORA_JPEG_QUALITY", 80),
            result_display_secs: env_u64("MEMORA_RESULT_DISPLAY_SECS", 8),
            language: std::env::var("MEMORA_LANGUAGE").unwrap_or_else(|_| "en-IN".to_string()),
        }
    }

    pub fn endpoints(&self) -> memora_client::WebhookEndpoints {
        memora_client::WebhookEndpoints {
            api_url: self.api_url.clone(),
            recognize_url: self.recognize_url.clone(),
            conversation_url: self.conversation_url.clone(),
        }
    }

    pub fn device_map(&self) -> memora_hw::DeviceMap {
        memora_hw::DeviceMap {
            front: self.front_device.clone(),
            rear: self.rear_device.clone(),
        }
    }
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
