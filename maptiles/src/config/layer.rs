use serde::Deserialize;

/// One named layer and the stylesheet its renderers are built from.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
	pub name: String,
	pub style: String,
}

impl From<(&str, &str)> for LayerConfig {
	fn from((name, style): (&str, &str)) -> Self {
		LayerConfig {
			name: name.to_string(),
			style: style.to_string(),
		}
	}
}
