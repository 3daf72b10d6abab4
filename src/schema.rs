//! Declarative description of the settings form.
//!
//! The core never renders anything.  It describes each field (id, label, widget, constraints and
//! help text) and a UI collaborator turns the description into inputs.

use serde::Serialize;

use crate::catalog::Catalog;
use crate::settings::{
    FREQUENCY_PENALTY_RANGE, MAX_STOP_SEQUENCES, MAX_TOKENS_RANGE, PRESENCE_PENALTY_RANGE,
    Settings, TEMPERATURE_RANGE, TOP_P_RANGE,
};

const MODEL_HELP: &str = "ID of the model to use. You can use the List models API to see all of \
your available models.";
const STREAM_HELP: &str = "Whether to stream back partial progress. If set, tokens will be sent \
as data-only server-sent events as they become available, with the stream terminated by a \
data: [DONE] message.";
const MAX_TOKENS_HELP: &str = "The maximum number of tokens that can be generated in the \
completion.\nThe token count of your prompt plus max_tokens cannot exceed the model's context \
length.";
const TEMPERATURE_HELP: &str = "What sampling temperature to use. Higher values like 0.8 will \
make the output more random, while lower values like 0.2 will make it more focused and \
deterministic.\nWe generally recommend altering this or top_p but not both.";
const TOP_P_HELP: &str = "An alternative to sampling with temperature, called nucleus sampling, \
where the model considers the results of the tokens with top_p probability mass. So 0.1 means \
only the tokens comprising the top 10% probability mass are considered.\nWe generally recommend \
altering this or temperature but not both.";
const FREQUENCY_PENALTY_HELP: &str = "Positive values penalize new tokens based on their \
existing frequency in the text so far, decreasing the model's likelihood to repeat the same \
line verbatim.";
const PRESENCE_PENALTY_HELP: &str = "Positive values penalize new tokens based on whether they \
appear in the text so far, increasing the model's likelihood to talk about new topics.";
const STOP_HELP: &str = "Up to 4 sequences where the API will stop generating further tokens. \
The returned text will not contain the stop sequence.";
const INSECURE_HELP: &str = "Accept any TLS certificate on connections through the proxy. Only \
enable this for an intercepting proxy you control.";

/// The input control a field is rendered with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum Widget {
    /// Free text.  Secret inputs never carry their current value.
    TextInput {
        /// Current value, absent for secrets and unset optionals.
        initial: Option<String>,
        /// Mask the input.
        secret: bool,
    },
    /// One choice out of `values`.
    Select {
        /// The choices, in order.
        values: Vec<String>,
        /// Index of the preselected choice.
        initial_index: usize,
    },
    /// On/off toggle.
    Switch {
        /// Current state.
        initial: bool,
    },
    /// Numeric slider.
    Slider {
        /// Current value.
        initial: f64,
        /// Lowest allowed value.
        min: f64,
        /// Highest allowed value.
        max: f64,
        /// Increment.
        step: f64,
    },
    /// A short list of strings.
    Tags {
        /// Current entries.
        initial: Vec<String>,
        /// Upper bound on entries.
        max_items: usize,
    },
}

/// One entry of the settings form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    /// Key of the field in the settings payload.
    pub id: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Control and constraints.
    #[serde(flatten)]
    pub widget: Widget,
    /// Tooltip text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<&'static str>,
}

/// The complete settings form, in display order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettingsSchema {
    /// Fields in display order.
    pub fields: Vec<FieldSpec>,
}

impl SettingsSchema {
    /// Describes `settings` with `catalog` as the domain of the model selector.
    ///
    /// The model selector preselects the committed model, or the first entry when the committed
    /// model is not in `catalog`.
    pub fn describe(settings: &Settings, catalog: &Catalog) -> Self {
        let fields = vec![
            FieldSpec {
                id: "base_url",
                label: "OPENAI_BASE_URL",
                widget: Widget::TextInput {
                    initial: Some(settings.base_url.clone()),
                    secret: false,
                },
                help: None,
            },
            FieldSpec {
                id: "proxy",
                label: "http_proxy",
                widget: Widget::TextInput {
                    initial: settings.proxy.clone(),
                    secret: false,
                },
                help: None,
            },
            FieldSpec {
                id: "api_key",
                label: "OPENAI_API_KEY",
                widget: Widget::TextInput {
                    initial: None,
                    secret: true,
                },
                help: None,
            },
            FieldSpec {
                id: "insecure",
                label: "insecure proxy",
                widget: Widget::Switch {
                    initial: settings.insecure,
                },
                help: Some(INSECURE_HELP),
            },
            FieldSpec {
                id: "model",
                label: "model",
                widget: Widget::Select {
                    values: catalog.models().to_vec(),
                    initial_index: catalog.position(&settings.model).unwrap_or(0),
                },
                help: Some(MODEL_HELP),
            },
            FieldSpec {
                id: "stream",
                label: "stream",
                widget: Widget::Switch {
                    initial: settings.stream,
                },
                help: Some(STREAM_HELP),
            },
            FieldSpec {
                id: "max_tokens",
                label: "max_tokens",
                widget: Widget::Slider {
                    initial: f64::from(settings.max_tokens),
                    min: f64::from(*MAX_TOKENS_RANGE.start()),
                    max: f64::from(*MAX_TOKENS_RANGE.end()),
                    step: 1.0,
                },
                help: Some(MAX_TOKENS_HELP),
            },
            slider(
                "temperature",
                settings.temperature,
                *TEMPERATURE_RANGE.start(),
                *TEMPERATURE_RANGE.end(),
                TEMPERATURE_HELP,
            ),
            slider(
                "top_p",
                settings.top_p,
                *TOP_P_RANGE.start(),
                *TOP_P_RANGE.end(),
                TOP_P_HELP,
            ),
            slider(
                "frequency_penalty",
                settings.frequency_penalty,
                *FREQUENCY_PENALTY_RANGE.start(),
                *FREQUENCY_PENALTY_RANGE.end(),
                FREQUENCY_PENALTY_HELP,
            ),
            slider(
                "presence_penalty",
                settings.presence_penalty,
                *PRESENCE_PENALTY_RANGE.start(),
                *PRESENCE_PENALTY_RANGE.end(),
                PRESENCE_PENALTY_HELP,
            ),
            FieldSpec {
                id: "stop",
                label: "stop",
                widget: Widget::Tags {
                    initial: settings.stop.clone(),
                    max_items: MAX_STOP_SEQUENCES,
                },
                help: Some(STOP_HELP),
            },
        ];
        Self { fields }
    }

    /// Looks up a field by id.
    pub fn field(&self, id: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.id == id)
    }
}

fn slider(id: &'static str, value: f32, min: f32, max: f32, help: &'static str) -> FieldSpec {
    FieldSpec {
        id,
        label: id,
        widget: Widget::Slider {
            initial: f64::from(value),
            min: f64::from(min),
            max: f64::from(max),
            step: 0.01,
        },
        help: Some(help),
    }
}
