//! # Responses
//!
//! An action returns a [`Reply`]. The dispatcher turns it into an HTTP response:
//!
//! - [`Reply::Empty`]: `204 No Content`.
//! - [`Reply::Body`]: a string is sent as text, any other JSON value as JSON.
//! - [`Reply::Custom`]: a [`ResponseProtocol`] object that is prepared with the request
//!   context and then writes the response itself.
//!
//! The stock protocol objects cover JSON, plain text, redirects, downloads and HTML views.

use crate::context::RequestContext;
use crate::error::BoxError;
use crate::transport::ResponseSink;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// A value that knows how to send itself.
pub trait ResponseProtocol: Send {
    /// Called before [`send`](Self::send) with the request context.
    fn prepare(&mut self, _ctx: &RequestContext) -> Result<(), BoxError> {
        Ok(())
    }

    fn send(&mut self, res: &ResponseSink) -> Result<(), BoxError>;
}

/// What an action produced.
pub enum Reply {
    Empty,
    Body(Value),
    Custom(Box<dyn ResponseProtocol>),
}

impl Reply {
    pub fn custom(response: impl ResponseProtocol + 'static) -> Self {
        Reply::Custom(Box::new(response))
    }

    pub fn json(value: impl Into<Value>) -> Self {
        Reply::custom(JsonResponse::new(value))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Reply::custom(TextResponse::new(text))
    }

    pub fn redirect(url: impl Into<String>) -> Self {
        Reply::custom(RedirectResponse::new(url))
    }

    pub fn download(path: impl Into<PathBuf>) -> Self {
        Reply::custom(DownloadResponse::new(path))
    }

    pub fn view(view: ViewResponse) -> Self {
        Reply::custom(view)
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Empty => f.write_str("Empty"),
            Reply::Body(value) => f.debug_tuple("Body").field(value).finish(),
            Reply::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Body(Value::String(text.to_string()))
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Body(Value::String(text))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Body(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct JsonResponse {
    data: Option<Value>,
}

impl JsonResponse {
    pub fn new(data: impl Into<Value>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

}

impl ResponseProtocol for JsonResponse {
    fn send(&mut self, res: &ResponseSink) -> Result<(), BoxError> {
        let data = self
            .data
            .take()
            .ok_or("'data' not found in JsonResponse")?;
        res.json(data)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextResponse {
    text: String,
}

impl TextResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ResponseProtocol for TextResponse {
    fn send(&mut self, res: &ResponseSink) -> Result<(), BoxError> {
        if self.text.is_empty() {
            return Err("'text' not found in TextResponse".into());
        }
        res.send_text(std::mem::take(&mut self.text))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RedirectResponse {
    url: String,
}

impl RedirectResponse {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl ResponseProtocol for RedirectResponse {
    fn send(&mut self, res: &ResponseSink) -> Result<(), BoxError> {
        if self.url.is_empty() {
            return Err("'url' not found in RedirectResponse".into());
        }
        res.redirect(&self.url)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct DownloadResponse {
    file_path: PathBuf,
}

impl DownloadResponse {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }
}

impl ResponseProtocol for DownloadResponse {
    fn send(&mut self, res: &ResponseSink) -> Result<(), BoxError> {
        if self.file_path.as_os_str().is_empty() {
            return Err("'file_path' not found in DownloadResponse".into());
        }
        res.download(&self.file_path)?;
        Ok(())
    }
}

/// Renders an HTML file from the controller's views directory.
///
/// Unless set explicitly, the file is `<action>.html` in
/// `<module>/<views_dir>/<Controller>/`. Every `{{ key }}` placeholder is replaced by the
/// matching value, then every raw search string added with [`replace`](Self::replace).
#[derive(Debug, Clone, Default)]
pub struct ViewResponse {
    file: Option<String>,
    subdir: Option<String>,
    dir: Option<PathBuf>,
    values: BTreeMap<String, String>,
    replacements: Vec<(String, String)>,
}

impl ViewResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the view by name. `"Shared/menu"` resolves to `Shared/menu.html` under the
    /// module's views directory; a bare name stays in the controller's directory. A name
    /// already ending in `.html` is kept as is.
    pub fn file(mut self, file: &str) -> Self {
        let (subdir, name) = match file.rsplit_once('/') {
            Some((subdir, name)) => (Some(subdir.to_string()), name),
            None => (None, file),
        };
        self.subdir = subdir;
        self.file = Some(if name.to_ascii_lowercase().ends_with(".html") {
            name.to_string()
        } else {
            format!("{name}.html")
        });
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Replaces every occurrence of `search` in the rendered file.
    pub fn replace(mut self, search: impl Into<String>, replace: impl Into<String>) -> Self {
        self.replacements.push((search.into(), replace.into()));
        self
    }

    fn render(&self, template: &str) -> String {
        let html = self
            .values
            .iter()
            .fold(template.to_string(), |html, (key, value)| {
                html.replace(&format!("{{{{ {key} }}}}"), value)
                    .replace(&format!("{{{{{key}}}}}"), value)
            });
        self.replacements
            .iter()
            .filter(|(search, _)| !search.is_empty())
            .fold(html, |html, (search, replace)| html.replace(search, replace))
    }
}

impl ResponseProtocol for ViewResponse {
    fn prepare(&mut self, ctx: &RequestContext) -> Result<(), BoxError> {
        if self.dir.is_none() {
            self.dir = Some(match &self.subdir {
                Some(subdir) => ctx.layout.views_path(&ctx.module, subdir),
                None => ctx.layout.views_path(&ctx.module, &ctx.controller),
            });
        }
        if self.file.is_none() {
            self.file = Some(format!("{}.html", ctx.action));
        }
        Ok(())
    }

    fn send(&mut self, res: &ResponseSink) -> Result<(), BoxError> {
        let (Some(dir), Some(file)) = (&self.dir, &self.file) else {
            return Err("ViewResponse was sent before being prepared".into());
        };
        let path = dir.join(file);
        let template = std::fs::read_to_string(&path)
            .map_err(|e| format!("Unable to find file {}: {e}", path.display()))?;
        res.send_html(self.render(&template))?;
        Ok(())
    }
}
