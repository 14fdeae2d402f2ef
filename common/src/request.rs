use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::error::InputError;

pub const DEFAULT_LORA_URL: &str =
    "https://huggingface.co/motimalu/wan-flat-color-v2/resolve/main/wan_flat_color_v2.safetensors";

/// Frame counts accepted by the API (roughly 1 to 5 seconds at 16fps).
pub const FRAME_OPTIONS: [u32; 5] = [17, 33, 49, 65, 81];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Model {
    #[default]
    #[serde(rename = "1.3b")]
    Small,
    #[serde(rename = "14b")]
    Large,
}

impl FromStr for Model {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.3b" => Ok(Self::Small),
            "14b" => Ok(Self::Large),
            _ => Err(anyhow!("Unknown model: {} (expected 1.3b or 14b)", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "480p" => Ok(Self::P480),
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            _ => Err(anyhow!("Unknown resolution: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Portrait,
}

impl FromStr for AspectRatio {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "16:9" => Ok(Self::Landscape),
            "1:1" => Ok(Self::Square),
            "9:16" => Ok(Self::Portrait),
            _ => Err(anyhow!("Unknown aspect ratio: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum FastMode {
    Off,
    #[default]
    Balanced,
    Fast,
}

impl FromStr for FastMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "balanced" => Ok(Self::Balanced),
            "fast" => Ok(Self::Fast),
            _ => Err(anyhow!("Unknown fast mode: {} (expected Off, Balanced or Fast)", s)),
        }
    }
}

/// Parameters of one text-to-video generation.
///
/// Field order matches the request body the API documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationInput {
    pub model: Model,
    pub frames: u32,
    pub prompt: String,
    /// `None` leaves the field out of the request entirely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lora_url: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub sample_shift: f64,
    pub resolution: Resolution,
    pub sample_steps: u32,
    pub negative_prompt: String,
    pub lora_strength_clip: f64,
    pub sample_guide_scale: f64,
    pub lora_strength_model: f64,
    pub seed: Option<u64>,
    pub fast_mode: FastMode,
}

impl Default for GenerationInput {
    fn default() -> Self {
        Self {
            model: Model::default(),
            frames: 81,
            prompt: String::new(),
            lora_url: Some(DEFAULT_LORA_URL.to_string()),
            aspect_ratio: AspectRatio::default(),
            sample_shift: 8.0,
            resolution: Resolution::default(),
            sample_steps: 30,
            negative_prompt: String::new(),
            lora_strength_clip: 1.0,
            sample_guide_scale: 5.0,
            lora_strength_model: 1.0,
            seed: None,
            fast_mode: FastMode::default(),
        }
    }
}

impl GenerationInput {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), ..Default::default() }
    }

    /// Selects a LoRA by URL; the literal `none` removes it.
    pub fn set_lora(&mut self, choice: &str) {
        let choice = choice.trim();
        self.lora_url = if choice.is_empty() || choice.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(choice.to_string())
        };
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.prompt.trim().is_empty() {
            return Err(InputError::PromptRequired);
        }
        if !FRAME_OPTIONS.contains(&self.frames) {
            return Err(InputError::InvalidFrames(self.frames));
        }
        check_range("sample_steps", self.sample_steps as f64, 1.0, 60.0)?;
        check_range("sample_guide_scale", self.sample_guide_scale, 0.0, 10.0)?;
        check_range("sample_shift", self.sample_shift, 0.0, 10.0)?;
        check_range("lora_strength_model", self.lora_strength_model, 0.0, 2.0)?;
        check_range("lora_strength_clip", self.lora_strength_clip, 0.0, 2.0)?;
        Ok(())
    }

    pub fn into_request(self) -> GenerationRequest {
        GenerationRequest { input: self }
    }

    /// Rebuilds the input from a stored request body so it can be submitted again.
    ///
    /// Missing fields take their defaults except `lora_url`. A request that
    /// was sent without a LoRA replays without one, not with the default preset.
    pub fn from_request_payload(payload: &str) -> Result<Self> {
        let request: serde_json::Value = serde_json::from_str(payload)
            .context("Stored request payload is not valid JSON")?;
        let input = request
            .get("input")
            .filter(|v| v.is_object())
            .ok_or_else(|| anyhow!("Stored request payload has no input object"))?;
        serde_json::from_value(input.clone())
            .context("Stored request payload has an unexpected shape")
    }
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<(), InputError> {
    if value < min || value > max || value.is_nan() {
        return Err(InputError::OutOfRange { field, min, max, value });
    }
    Ok(())
}

/// Wire body of `POST /run`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationRequest {
    pub input: GenerationInput,
}

impl GenerationRequest {
    /// Pretty-printed form stored with the job for later replay.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoraPreset {
    pub label: &'static str,
    pub url: &'static str,
    pub description: &'static str,
}

impl LoraPreset {
    pub fn find(url: &str) -> Option<&'static LoraPreset> {
        LORA_PRESETS.iter().find(|p| p.url == url)
    }
}

pub const LORA_PRESETS: &[LoraPreset] = &[
    LoraPreset {
        label: "360 Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/360_epoch20.safetensors",
        description: "Creates a 360-degree spinning or panoramic effect around the subject.",
    },
    LoraPreset {
        label: "Aging Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/aging_30_epochs.safetensors",
        description: "Adds an aging transformation to subjects, showing progression through time.",
    },
    LoraPreset {
        label: "Baby Style",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/baby_epoch_50.safetensors",
        description: "Transforms subjects to have more baby-like or childish features.",
    },
    LoraPreset {
        label: "Base I2V LoRA",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/wan-1.3b-cfgdistill-video-4.0-00001000_comfy.safetensors",
        description: "Base LoRA model for image-to-video transformation with the 1.3b model.",
    },
    LoraPreset {
        label: "Bride Transformation",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/bride50.safetensors",
        description: "Transforms a subject into bridal attire and styling.",
    },
    LoraPreset {
        label: "Cake Style",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/cakeify_16_epochs.safetensors",
        description: "Transforms subjects or scenes into cake-like textures and appearances.",
    },
    LoraPreset {
        label: "Crushing Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/crushit_epoch20.safetensors",
        description: "Applies a crushing or compressing animation to subjects.",
    },
    LoraPreset {
        label: "Decay Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/decay_50_epochs.safetensors",
        description: "Adds deterioration, aging, or weathering effects to subjects.",
    },
    LoraPreset {
        label: "Deflate Animation",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/deflate_epoch20.safetensors",
        description: "Creates a deflating animation effect on subjects.",
    },
    LoraPreset {
        label: "Flying Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/flying_effect.safetensors",
        description: "Adds movement suggesting flight or floating in air.",
    },
    LoraPreset {
        label: "Flying Effect (Wan2.1)",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/flying_effect(Wan2.1 I2V LoRA).safetensors",
        description: "An optimized flying effect specifically tuned for Wan2.1 models.",
    },
    LoraPreset {
        label: "Gun Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/gun_epoch20.safetensors",
        description: "Creates animations related to firearms or shooting.",
    },
    LoraPreset {
        label: "Inflate Animation",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/inflate_20_epochs.safetensors",
        description: "Produces an inflating or expanding effect on subjects.",
    },
    LoraPreset {
        label: "Jungle Environment",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/jungle_50_epochs.safetensors",
        description: "Transforms scenes to have jungle or tropical forest qualities.",
    },
    LoraPreset {
        label: "Landscape Effect",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/sc1-f1_l4ndsc4p3.safetensors",
        description: "Optimizes scenes for landscape views and natural environments.",
    },
    LoraPreset {
        label: "Mona Lisa Style",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/mona_lisa_35_epochs.safetensors",
        description: "Applies a style reminiscent of Leonardo da Vinci's Mona Lisa.",
    },
    LoraPreset {
        label: "Muscle Enhancement",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/muscles_epoch18.safetensors",
        description: "Enhances or adds muscular definition to subjects.",
    },
    LoraPreset {
        label: "Painting Style",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/painting_50_epochs.safetensors",
        description: "Transforms videos to have a hand-painted artistic quality.",
    },
    LoraPreset {
        label: "Samurai Transformation",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/samurai_50_epochs.safetensors",
        description: "Transforms subjects to have samurai-themed attire and styling.",
    },
    LoraPreset {
        label: "Squish Animation",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/squish_18.safetensors",
        description: "Creates a squishing or compressing animation effect.",
    },
    LoraPreset {
        label: "VIP Styling",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/vip_50_epochs.safetensors",
        description: "Adds elements suggesting VIP status, luxury, or celebrity treatment.",
    },
    LoraPreset {
        label: "Warrior Transformation",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/warrior_45_epochs.safetensors",
        description: "Transforms subjects into warrior-like appearances.",
    },
    LoraPreset {
        label: "Westworld Style",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/remade_westworld_35.safetensors",
        description: "Applies a style reminiscent of the Westworld show aesthetics.",
    },
    LoraPreset {
        label: "Zen Style",
        url: "https://dtu1vvf8tvi89.cloudfront.net/wan/i2v_lora/zen_50_epochs.safetensors",
        description: "Adds elements suggesting tranquility, meditation, and zen-like qualities.",
    },
    LoraPreset {
        label: "Wan Flat Color v2",
        url: "https://huggingface.co/motimalu/wan-flat-color-v2/resolve/main/wan_flat_color_v2.safetensors",
        description: "Flat color style with vibrant colors and simplified forms.",
    },
    LoraPreset {
        label: "Wan Anime v1",
        url: "https://huggingface.co/motimalu/wan-anime-style/resolve/main/wan_anime_style_v1.safetensors",
        description: "Anime-inspired style with characteristic line work and aesthetics.",
    },
    LoraPreset {
        label: "Wan Watercolor v1",
        url: "https://huggingface.co/motimalu/wan-watercolor/resolve/main/wan_watercolor_v1.safetensors",
        description: "Watercolor painting effect with soft edges and color blending.",
    },
    LoraPreset {
        label: "Wan Pixel Art v1",
        url: "https://huggingface.co/motimalu/wan-pixel-art/resolve/main/wan_pixel_art_v1.safetensors",
        description: "Pixel art style with blocky, retro game aesthetics.",
    },
];
