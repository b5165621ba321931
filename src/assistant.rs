//! Remote assistant client
//!
//! Stateless request/response operations against the REST `generateContent` endpoint,
//! plus [`LiveConnector`] for opening live audio sessions. Every failure, including a
//! response without a usable payload, surfaces as [`Error::RemoteService`]; nothing is
//! retried.

use crate::codec;
use crate::config::AssistantConfig;
use crate::crm::{format_inr, PerformanceSnapshot};
use crate::error::{Error, Result};
use crate::gemini::{
    BidiGenerateContentSetup, Content, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, ImageConfig, Part, ResponseModality, SpeechConfig, ThinkingConfig, Tool,
};
use crate::live::{self, LiveConnector, LiveHandle, LiveLink};

use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// What a caller shows in place of an answer when an operation fails.
pub const FALLBACK_REPLY: &str =
    "I encountered an error. Please try again or check your API key settings.";

/// Preset regulatory searches offered next to the search box.
pub const QUICK_SEARCHES: [&str; 5] = [
    "DGCA Cabin Crew Medicals",
    "AAI Ground Handling Policy",
    "Grooming Standards CAR",
    "Dangerous Goods Training",
    "Airport Security Pass Rules",
];

/// Title used for a grounding source that came back without one.
pub const DEFAULT_CITATION_TITLE: &str = "Official Regulatory Source";

const REGULATORY_KEYWORDS: [&str; 10] = [
    "dgca",
    "aai",
    "regulation",
    "rule",
    "car ",
    "circular",
    "medical",
    "exam",
    "policy",
    "protocol",
];

/// Image aspect ratios accepted by the image model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
    Widescreen,
    Vertical,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
        AspectRatio::Widescreen,
        AspectRatio::Vertical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Vertical => "9:16",
        }
    }
}

/// Output resolution of generated images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSize {
    #[default]
    OneK,
    TwoK,
    FourK,
}

impl ImageSize {
    pub const ALL: [ImageSize; 3] = [ImageSize::OneK, ImageSize::TwoK, ImageSize::FourK];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

/// Prebuilt voices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Voice {
    /// Text-to-speech voice.
    Kore,
    /// Live coaching voice.
    Zephyr,
}

impl Voice {
    pub const ALL: [Voice; 2] = [Voice::Kore, Voice::Zephyr];

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Zephyr => "Zephyr",
        }
    }
}

macro_rules! display_and_parse {
    ($ty:ty, $what:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| Error::Config(format!("unknown {}: {}", $what, s)))
            }
        }
    };
}

display_and_parse!(AspectRatio, "aspect ratio");
display_and_parse!(ImageSize, "image size");
display_and_parse!(Voice, "voice");

/// A web source backing a search answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchAnswer {
    pub text: String,
    pub sources: Vec<Citation>,
}

/// Result of [`AssistantClient::ask`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Search(SearchAnswer),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) => text,
            Reply::Search(answer) => &answer.text,
        }
    }
}

/// Whether a chat prompt should be answered with grounded search.
pub fn is_regulatory_query(prompt: &str) -> bool {
    let prompt = prompt.to_lowercase();
    REGULATORY_KEYWORDS.iter().any(|k| prompt.contains(k))
}

/// Citations from the first candidate's grounding metadata.
///
/// Missing titles get [`DEFAULT_CITATION_TITLE`]; sources without a URI are dropped.
pub fn extract_citations(response: &GenerateContentResponse) -> Vec<Citation> {
    response
        .grounding_chunks()
        .iter()
        .filter_map(|chunk| chunk.web.as_ref())
        .filter_map(|web| {
            let uri = web.uri.as_deref().filter(|u| !u.is_empty())?;
            let title = web
                .title
                .as_deref()
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_CITATION_TITLE);
            Some(Citation {
                title: title.to_string(),
                uri: uri.to_string(),
            })
        })
        .collect()
}

fn text_request(prompt: String, generation_config: GenerationConfig) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content::user(vec![Part::text(prompt)])],
        generation_config,
        ..Default::default()
    }
}

fn thinking(budget: u32) -> GenerationConfig {
    GenerationConfig {
        thinking_config: Some(ThinkingConfig {
            thinking_budget: budget,
        }),
        ..Default::default()
    }
}

fn require_text(response: &GenerateContentResponse, operation: &str) -> Result<String> {
    response
        .text()
        .ok_or_else(|| Error::remote(format!("{} returned no text", operation)))
}

fn require_image(response: &GenerateContentResponse, operation: &str) -> Result<String> {
    let blob = response
        .first_inline_data()
        .ok_or_else(|| Error::remote(format!("{} returned no inline image", operation)))?;
    Ok(codec::to_data_uri("image/png", &blob.data))
}

/// Client for the remote generative model.
#[derive(Clone)]
pub struct AssistantClient {
    http: reqwest::Client,
    config: AssistantConfig,
}

impl AssistantClient {
    pub fn new(config: AssistantConfig) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        debug!("generateContent request to {}", model);

        let resp = self
            .http
            .post(self.config.generate_content_url(model))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::remote(format!("request to {} failed: {}", model, e.without_url())))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::remote(format!("reading {} response failed: {}", model, e.without_url())))?;

        if !status.is_success() {
            warn!("{} returned HTTP {}", model, status);
            return Err(Error::remote(format!("{} returned HTTP {}: {}", model, status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::remote(format!("malformed {} response: {}", model, e)))
    }

    /// Low-latency answer framed for aviation hospitality.
    pub async fn quick_feedback(&self, prompt: &str) -> Result<String> {
        let request = text_request(
            format!(
                "Context: Indian Aviation Hospitality & Travel Management. Prompt: {}",
                prompt
            ),
            GenerationConfig::default(),
        );
        let response = self.generate(&self.config.models.quick, &request).await?;
        require_text(&response, "quick_feedback")
    }

    /// Deep-reasoning answer with DGCA and AAI regulatory framing.
    pub async fn solve_complex_problem(&self, prompt: &str) -> Result<String> {
        let request = text_request(
            format!(
                "You are an expert Aviation Regulatory Consultant for Vision Aviation Academy, India. \
                 Your focus is Hospitality & Travel Management. \
                 Incorporate specific DGCA (Directorate General of Civil Aviation) rules for cabin crew medicals, \
                 grooming, and safety training, and AAI (Airports Authority of India) protocols for ground handling, \
                 airport security, and passenger facilitation.\n\nProblem/Query: {}",
                prompt
            ),
            thinking(self.config.complex_thinking_budget),
        );
        let response = self.generate(&self.config.models.reasoning, &request).await?;
        require_text(&response, "solve_complex_problem")
    }

    /// Strategic overview of the sales dashboard figures.
    pub async fn analyze_performance(&self, snapshot: &PerformanceSnapshot) -> Result<String> {
        let request = text_request(
            format!(
                "Analyze the following hospitality training sales performance for Vision Aviation Academy \
                 and provide a brief strategic overview:\n\
                 Total Leads: {}\n\
                 Conversion Rate: {}%\n\
                 Total Revenue: \u{20b9}{}",
                snapshot.total_leads,
                snapshot.conversion_rate,
                format_inr(snapshot.total_revenue)
            ),
            thinking(self.config.analysis_thinking_budget),
        );
        let response = self.generate(&self.config.models.reasoning, &request).await?;
        require_text(&response, "analyze_performance")
    }

    /// Search-grounded answer about Indian aviation regulations, with its sources.
    pub async fn search_regulations(&self, query: &str) -> Result<SearchAnswer> {
        let mut request = text_request(
            format!(
                "Search for official information from DGCA (dgca.gov.in) and AAI (aai.aero) regarding: {}. \
                 Focus on Airline Cabin Crew requirements, Ground Staff regulations, and Travel Industry laws in India.",
                query
            ),
            GenerationConfig::default(),
        );
        request.tools = Some(vec![Tool::google_search()]);

        let response = self.generate(&self.config.models.search, &request).await?;
        let text = require_text(&response, "search_regulations")?;
        let sources = extract_citations(&response);
        info!("Search answer with {} sources", sources.len());
        Ok(SearchAnswer { text, sources })
    }

    /// Generate a branded image, returned as a PNG data URI.
    pub async fn generate_image(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        image_size: ImageSize,
    ) -> Result<String> {
        let request = text_request(
            format!(
                "A professional image showing high-end aviation hospitality, cabin crew, \
                 or luxury airport lounge management: {}",
                prompt
            ),
            GenerationConfig {
                image_config: Some(ImageConfig {
                    aspect_ratio: aspect_ratio.as_str().to_string(),
                    image_size: image_size.as_str().to_string(),
                }),
                ..Default::default()
            },
        );
        let response = self
            .generate(&self.config.models.image_generation, &request)
            .await?;
        require_image(&response, "generate_image")
    }

    /// Edit an image according to `prompt`.
    ///
    /// `image` may be bare base64 or a full data URI.
    pub async fn edit_image(&self, image: &str, prompt: &str, mime_type: &str) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(vec![
                Part::inline(mime_type, codec::strip_data_uri(image)),
                Part::text(prompt),
            ])],
            ..Default::default()
        };
        let response = self.generate(&self.config.models.image_editing, &request).await?;
        require_image(&response, "edit_image")
    }

    /// Synthesize `text` as raw 24 kHz mono 16-bit PCM.
    pub async fn speak(&self, text: &str) -> Result<Vec<u8>> {
        let request = text_request(
            text.to_string(),
            GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: Some(SpeechConfig::prebuilt(Voice::Kore.as_str())),
                ..Default::default()
            },
        );
        let response = self.generate(&self.config.models.speech, &request).await?;
        let blob = response
            .first_inline_data()
            .ok_or_else(|| Error::remote("speak returned no inline audio"))?;
        Ok(codec::decode_text(&blob.data)?)
    }

    /// Answer a chat prompt, using grounded search for regulatory questions.
    pub async fn ask(&self, prompt: &str) -> Result<Reply> {
        if is_regulatory_query(prompt) {
            debug!("Routing prompt to regulatory search");
            Ok(Reply::Search(self.search_regulations(prompt).await?))
        } else {
            Ok(Reply::Text(self.solve_complex_problem(prompt).await?))
        }
    }

    /// Setup message for a live coaching session.
    pub fn live_setup(&self) -> BidiGenerateContentSetup {
        BidiGenerateContentSetup {
            model: format!("models/{}", self.config.models.live),
            generation_config: Some(GenerationConfig {
                response_modalities: vec![ResponseModality::Audio],
                speech_config: Some(SpeechConfig::prebuilt(Voice::Zephyr.as_str())),
                ..Default::default()
            }),
            system_instruction: Some(Content::system(self.config.live_system_instruction.clone())),
        }
    }
}

impl LiveConnector for AssistantClient {
    type Transport = LiveHandle;

    fn connect_live(&self) -> Result<LiveLink<LiveHandle>> {
        info!("Opening live session with {}", self.config.models.live);
        Ok(live::open(self.config.live_endpoint(), self.live_setup()))
    }
}
