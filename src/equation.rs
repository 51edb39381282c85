//! Equation block formatting.
//!
//! The configured style is resolved once into an [`EquationFormatter`]; the
//! Markdown converter calls [`EquationFormatter::format`] for every equation
//! block.

use std::fmt;
use std::sync::Arc;
use tracing::warn;

pub const KATEX_STYLESHEET: &str = r#"<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@0.16.2/dist/katex.min.css" integrity="sha384-bYdxxUwYipFNohQlHt0bjN/LCpueqWz13HufFEV1SUatKs1cm4L6fFgCi1jT643X" crossorigin="anonymous">"#;

/// Renders a TeX expression to static display-mode markup.
pub trait MathRenderer: Send + Sync {
    fn render_display(&self, expression: &str) -> String;
}

#[cfg(feature = "katex")]
pub struct KatexRenderer {
    opts: katex::Opts,
}

#[cfg(feature = "katex")]
impl KatexRenderer {
    pub fn new() -> anyhow::Result<Self> {
        let opts = katex::Opts::builder()
            .display_mode(true)
            .throw_on_error(false)
            .build()
            .map_err(|e| anyhow::anyhow!("invalid KaTeX options: {}", e))?;
        Ok(Self { opts })
    }
}

#[cfg(feature = "katex")]
impl MathRenderer for KatexRenderer {
    fn render_display(&self, expression: &str) -> String {
        match katex::render_with_opts(expression, &self.opts) {
            Ok(html) => html,
            Err(err) => {
                warn!(%expression, ?err, "KaTeX failed to render equation");
                PlainMathRenderer.render_display(expression)
            }
        }
    }
}

/// Escaped `\[..\]` markup for client-side typesetting. Used when KaTeX is
/// unavailable.
pub struct PlainMathRenderer;

impl MathRenderer for PlainMathRenderer {
    fn render_display(&self, expression: &str) -> String {
        format!(
            r#"<div class="math math-display">\[{}\]</div>"#,
            escape_html(expression)
        )
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn default_math_renderer() -> Arc<dyn MathRenderer> {
    #[cfg(feature = "katex")]
    {
        match KatexRenderer::new() {
            Ok(renderer) => return Arc::new(renderer),
            Err(err) => warn!(?err, "falling back to plain math markup"),
        }
    }
    Arc::new(PlainMathRenderer)
}

#[derive(Clone)]
pub enum EquationFormatter {
    /// `\[expr\]`
    Markdown,
    /// `{{< math >}}\[expr\]{{< /math >}}`
    Shortcode,
    /// Pre-rendered markup plus the KaTeX stylesheet in the head fragment.
    Html(Arc<dyn MathRenderer>),
    /// Unrecognized style; equations render as nothing.
    Unsupported(String),
}

impl fmt::Debug for EquationFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquationFormatter::Markdown => f.write_str("Markdown"),
            EquationFormatter::Shortcode => f.write_str("Shortcode"),
            EquationFormatter::Html(_) => f.write_str("Html"),
            EquationFormatter::Unsupported(style) => f.debug_tuple("Unsupported").field(style).finish(),
        }
    }
}

impl EquationFormatter {
    pub fn from_style(style: &str) -> Self {
        if style == "html" {
            return EquationFormatter::Html(default_math_renderer());
        }
        Self::with_renderer(style, Arc::new(PlainMathRenderer))
    }

    pub fn with_renderer(style: &str, math: Arc<dyn MathRenderer>) -> Self {
        match style {
            "markdown" => EquationFormatter::Markdown,
            "shortcode" => EquationFormatter::Shortcode,
            "html" => EquationFormatter::Html(math),
            other => {
                warn!(style = other, "invalid formatter.equation.style; equations will be dropped");
                EquationFormatter::Unsupported(other.to_string())
            }
        }
    }

    pub fn format(&self, expression: &str) -> String {
        match self {
            EquationFormatter::Markdown => format!("\\[{}\\]", expression),
            EquationFormatter::Shortcode => {
                format!("{{{{< math >}}}}\\[{}\\]{{{{< /math >}}}}", expression)
            }
            EquationFormatter::Html(math) => math.render_display(expression),
            EquationFormatter::Unsupported(_) => String::new(),
        }
    }

    /// Markup injected between the front matter and the body.
    pub fn head_fragment(&self) -> String {
        match self {
            EquationFormatter::Html(_) => format!("{}\n", KATEX_STYLESHEET),
            _ => String::new(),
        }
    }
}
