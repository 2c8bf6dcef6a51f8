use foundation::time::TimeTag;

/// A renderable imagery source for one time sample.
///
/// Every call to a factory yields a distinct `provider_id`, even for the
/// same tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagerySource {
    pub provider_id: u64,
    pub name: String,
    pub url: String,
    pub tag: Option<TimeTag>,
    pub pick_features: bool,
}

/// Builds imagery sources for an entry.
///
/// `tag` is `None` for entries that are not time-varying.
pub trait LayerFactory {
    fn create_imagery_source(&mut self, tag: Option<&TimeTag>) -> ImagerySource;
}

/// Expands `{time}` in a URL template with the sample's tag.
#[derive(Debug, Clone)]
pub struct TemplateLayerFactory {
    name: String,
    url_template: String,
    next_provider: u64,
}

impl TemplateLayerFactory {
    pub const TIME_PLACEHOLDER: &'static str = "{time}";

    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            next_provider: 1,
        }
    }

    pub fn created(&self) -> u64 {
        self.next_provider - 1
    }
}

impl LayerFactory for TemplateLayerFactory {
    fn create_imagery_source(&mut self, tag: Option<&TimeTag>) -> ImagerySource {
        let provider_id = self.next_provider;
        self.next_provider += 1;

        let value = tag.map(TimeTag::as_str).unwrap_or("");
        ImagerySource {
            provider_id,
            name: self.name.clone(),
            url: self.url_template.replace(Self::TIME_PLACEHOLDER, value),
            tag: tag.cloned(),
            pick_features: true,
        }
    }
}
