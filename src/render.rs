use chrono::Local;
use minijinja::{context, Environment};
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use crate::config::{ASSISTANT_LABEL, USER_LABEL};
use crate::error::Result;
use crate::events::{EventBus, ViewEvent};
use crate::notify::Notification;

const HIGHLIGHT_THEME: &str = "base16-ocean.dark";

lazy_static::lazy_static! {
    static ref SYNTAXES: SyntaxSet = SyntaxSet::load_defaults_newlines();
    static ref THEMES: ThemeSet = ThemeSet::load_defaults();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => USER_LABEL,
            Role::Assistant => ASSISTANT_LABEL,
        }
    }
}

/// A rendered transcript item. `body` is what the sender wrote, `html` the
/// finished block (avatar, header, rendered body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub role: Role,
    pub sender: String,
    pub timestamp: String,
    pub body: String,
    pub html: String,
}

/// Markdown to HTML with highlighted fenced code. Raw HTML in the source is
/// passed through, which is how generated images get embedded.
pub fn render_markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH);

    let mut events = Vec::new();
    let mut code_block: Option<(String, Vec<Event>)> = None;
    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                let lang = match &kind {
                    CodeBlockKind::Fenced(info) => info.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                code_block = Some((lang, vec![Event::Start(Tag::CodeBlock(kind))]));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, mut buffered)) = code_block.take() {
                    let code: String = buffered
                        .iter()
                        .filter_map(|e| match e {
                            Event::Text(text) => Some(&**text),
                            _ => None,
                        })
                        .collect();
                    match highlight_code(&lang, &code) {
                        Some(highlighted) => events.push(Event::Html(highlighted.into())),
                        None => {
                            buffered.push(Event::End(TagEnd::CodeBlock));
                            events.extend(buffered);
                        }
                    }
                }
            }
            other => match code_block.as_mut() {
                Some((_, buffered)) => buffered.push(other),
                None => events.push(other),
            },
        }
    }

    let mut out = String::new();
    html::push_html(&mut out, events.into_iter());
    out
}

/// `None` when the info string names no known syntax; the caller keeps the plain block.
fn highlight_code(info: &str, code: &str) -> Option<String> {
    let token = info.split(|c: char| c == ',' || c.is_whitespace()).next()?;
    if token.is_empty() {
        return None;
    }
    let syntax = SYNTAXES.find_syntax_by_token(token)?;
    let theme = THEMES.themes.get(HIGHLIGHT_THEME)?;
    match highlighted_html_for_string(code, &SYNTAXES, syntax, theme) {
        Ok(highlighted) => Some(highlighted),
        Err(e) => {
            tracing::warn!(language = token, "highlighting failed: {}", e);
            None
        }
    }
}

fn templates() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("entry.html", include_str!("templates/entry.html"))?;
    env.add_template("image.html", include_str!("templates/image.html"))?;
    env.add_template("page.html", include_str!("templates/page.html"))?;
    Ok(env)
}

/// The visible transcript: ordered entries plus a scroll position that
/// follows the newest one.
pub struct RenderSurface {
    env: Environment<'static>,
    entries: Vec<MessageEntry>,
    scroll_position: usize,
    events: EventBus,
}

impl RenderSurface {
    pub fn new(events: EventBus) -> Result<Self> {
        Ok(Self {
            env: templates()?,
            entries: Vec::new(),
            scroll_position: 0,
            events,
        })
    }

    pub fn append(&mut self, role: Role, body: &str) -> Result<&MessageEntry> {
        let timestamp = Local::now().format("%I:%M %p").to_string();
        let (rendered_body, markup) = match role {
            Role::Assistant => (render_markdown(body), true),
            Role::User => (body.to_string(), false),
        };
        let html = self.env.get_template("entry.html")?.render(context! {
            role => role,
            sender => role.label(),
            timestamp => &timestamp,
            body => rendered_body,
            markup => markup,
        })?;

        let entry = MessageEntry {
            role,
            sender: role.label().to_string(),
            timestamp,
            body: body.to_string(),
            html,
        };
        tracing::debug!(role = ?role, "appending message entry");
        self.events.emit(ViewEvent::EntryAppended(entry.clone()));
        self.entries.push(entry);
        self.scroll_to_bottom();
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// `<img>` markup for an assistant body, with the attributes escaped.
    pub fn image_tag(&self, src: &str, alt: &str) -> Result<String> {
        let tag = self
            .env
            .get_template("image.html")?
            .render(context! { src => src, alt => alt })?;
        Ok(tag.trim_end().to_string())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.scroll_position = 0;
        self.events.emit(ViewEvent::Cleared);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_position = self.max_scroll();
    }

    pub fn is_at_bottom(&self) -> bool {
        self.scroll_position == self.max_scroll()
    }

    fn max_scroll(&self) -> usize {
        self.entries.len().saturating_sub(1)
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The whole surface as a standalone document, for the web view.
    pub fn render_page(&self, typing: bool, notifications: &[Notification]) -> Result<String> {
        let page = self.env.get_template("page.html")?.render(context! {
            title => format!("{} Chat", ASSISTANT_LABEL),
            assistant => ASSISTANT_LABEL,
            entries => &self.entries,
            typing => typing,
            notifications => notifications,
        })?;
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> RenderSurface {
        RenderSurface::new(EventBus::new()).unwrap()
    }

    #[test]
    fn test_user_body_is_escaped() {
        let mut surface = surface();
        let entry = surface.append(Role::User, "<b>hi</b> & bye").unwrap();
        assert!(entry.html.contains("&lt;b&gt;hi"));
        assert!(entry.html.contains("&amp; bye"));
        assert!(!entry.html.contains("<b>hi"));
        assert!(entry.html.contains(r#"<span class="message-sender">You</span>"#));
    }

    #[test]
    fn test_assistant_body_is_markdown() {
        let mut surface = surface();
        let entry = surface.append(Role::Assistant, "**Hi** there").unwrap();
        assert!(entry.html.contains("<strong>Hi</strong> there"));
        assert!(entry.html.contains("YBrix"));
        assert_eq!(entry.body, "**Hi** there");
    }

    #[test]
    fn test_known_language_is_highlighted() {
        let html = render_markdown("```rust\nfn main() {}\n```\n");
        assert!(html.contains("<pre style="));
        assert!(html.contains("main"));
        assert!(!html.contains("language-rust"));
    }

    #[test]
    fn test_unknown_language_keeps_plain_block() {
        let html = render_markdown("```nosuchlang\n<tag>\n```\n");
        assert!(html.contains(r#"<code class="language-nosuchlang">"#));
        assert!(html.contains("&lt;tag&gt;"));
    }

    #[test]
    fn test_raw_html_passes_through_assistant_markdown() {
        let html = render_markdown("Generated image: cube\n\n<img src=\"data:image/png;base64,AAAA\" alt=\"cube\">");
        assert!(html.contains("<img src=\"data:image/png;base64,AAAA\""));
    }

    #[test]
    fn test_image_tag_escapes_alt() {
        let surface = surface();
        let tag = surface.image_tag("data:image/png;base64,AA", "a \"red\" <cube>").unwrap();
        assert!(tag.starts_with("<img src="));
        assert!(tag.contains("base64,AA"));
        assert!(!tag.contains("<cube>"));
        assert!(tag.contains("&quot;red&quot;"));
        assert!(tag.contains("&lt;cube&gt;"));
    }

    #[test]
    fn test_append_follows_newest_entry() {
        let mut surface = surface();
        surface.append(Role::User, "one").unwrap();
        surface.append(Role::Assistant, "two").unwrap();
        assert_eq!(surface.scroll_position, 1);

        // A reader who scrolled back is brought to the newest entry.
        surface.scroll_position = 0;
        assert!(!surface.is_at_bottom());
        surface.append(Role::User, "three").unwrap();
        assert!(surface.is_at_bottom());
        assert_eq!(surface.scroll_position, 2);
        assert_eq!(surface.len(), 3);
    }

    #[test]
    fn test_clear_removes_entries() {
        let mut surface = surface();
        surface.append(Role::User, "one").unwrap();
        surface.append(Role::Assistant, "two").unwrap();
        surface.clear();
        assert!(surface.is_empty());
        assert_eq!(surface.scroll_position, 0);
        assert!(surface.is_at_bottom());
    }

    #[test]
    fn test_append_and_clear_are_broadcast() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let mut surface = RenderSurface::new(bus).unwrap();

        surface.append(Role::User, "ping").unwrap();
        surface.clear();

        match rx.try_recv().unwrap() {
            ViewEvent::EntryAppended(entry) => assert_eq!(entry.body, "ping"),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(rx.try_recv().unwrap(), ViewEvent::Cleared);
    }

    #[test]
    fn test_page_contains_entries_and_typing_state() {
        let mut surface = surface();
        surface.append(Role::User, "Hello").unwrap();
        let page = surface.render_page(true, &[]).unwrap();
        assert!(page.contains("<title>YBrix Chat</title>"));
        assert!(page.contains("Hello"));
        assert!(page.contains("#typingIndicator { display: flex;"));
    }
}
