//! HTML fragments for the results list and the query-weight editor.
//!
//! Both renderers are pure functions of the payload: the same payload always
//! produces byte-identical markup. The thumbnail update that the query editor
//! implies is returned as data and applied by the caller.

use crate::payload::{CaseEntry, QueryTerm, ResultPayload, Scalar};
use askama::Template;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
#[error("template rendering failed: {0}")]
pub struct RenderError(#[from] askama::Error);

/// What clicking a case affordance asks the backend to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    /// Shown as "Like" on a case that is not selected.
    Add,
    /// Shown as "Unlike" on a selected case.
    Remove,
}

impl ItemAction {
    pub fn for_selection(selected: bool) -> Self {
        if selected {
            ItemAction::Remove
        } else {
            ItemAction::Add
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            ItemAction::Add => "plus",
            ItemAction::Remove => "remove",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            ItemAction::Add => "/backend-api/add_item",
            ItemAction::Remove => "/backend-api/remove_item",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "add" | "like" => Some(ItemAction::Add),
            "remove" | "unlike" => Some(ItemAction::Remove),
            _ => None,
        }
    }
}

impl fmt::Display for ItemAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemAction::Add => write!(f, "add"),
            ItemAction::Remove => write!(f, "remove"),
        }
    }
}

/// A rendered like/unlike control, bound to the case it was rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub index: usize,
    pub case_id: String,
    pub action: ItemAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultFragment {
    pub markup: String,
    pub affordances: Vec<Affordance>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailUpdate {
    Keep,
    Replace(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryFragment {
    pub markup: String,
    pub thumbnail: ThumbnailUpdate,
}

/// All three region contents for one payload, as served to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragments {
    pub result: String,
    pub queryset: String,
    pub thumbnail: Option<String>,
}

struct CaseCard<'a> {
    entry: &'a CaseEntry,
    action: ItemAction,
    selected: bool,
}

struct SliderRow<'a> {
    query: &'a Scalar,
    value: String,
}

#[derive(Template)]
#[template(
    source = r#"{% for card in cards %}
<div class="case">
    <div class="case-head">
        <p class="case-title">{{ card.entry.name }}</p>
        <span class="info">Score: {{ card.entry.similarity }}</span>
        <span class="{{ card.action.css_class() }}" data-action="{{ card.action }}" data-caseid="{{ card.entry.case_id }}">{% if card.selected %}&#x2665; Unlike{% else %}&#x2661; Like{% endif %}</span>
    </div>
    <div class="image-wrapper">
        <div class="image-container">
            <a href="{{ card.entry.web_url }}"><img src="{{ card.entry.image_path }}"></a>
        </div>
    </div>
    <p class="entry">{{ card.entry.entry }}</p>
    <span class="tag"># {{ card.entry.category }}</span>
    <span class="tag"># {{ card.entry.topic }}</span>
</div>
{% endfor %}"#,
    ext = "html"
)]
struct ResultsTemplate<'a> {
    cards: Vec<CaseCard<'a>>,
}

#[derive(Template)]
#[template(
    source = r#"{% for row in rows %}
<div class="query">
    <p class="query-content">{{ row.query }}</p>
    <input type="range" min="0" max="1" step="0.01" value="{{ row.value }}" class="slider" id="slider{{ loop.index0 }}">
</div>
{% endfor %}"#,
    ext = "html"
)]
struct QueryTemplate<'a> {
    rows: Vec<SliderRow<'a>>,
}

#[derive(Template)]
#[template(source = r#"<img src="{{ src }}">"#, ext = "html")]
struct ThumbnailTemplate<'a> {
    src: &'a str,
}

/// Renders one card per case, each with the affordance its selection flag calls for.
pub fn render_results(payload: &ResultPayload) -> Result<ResultFragment, RenderError> {
    if !payload.is_aligned() {
        warn!(
            cases = payload.result.len(),
            flags = payload.selected.len(),
            "selection flags do not line up with results"
        );
    }
    let cards: Vec<CaseCard<'_>> = payload
        .result
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let selected = payload.is_selected(index);
            CaseCard {
                entry,
                action: ItemAction::for_selection(selected),
                selected,
            }
        })
        .collect();
    let affordances = cards
        .iter()
        .enumerate()
        .map(|(index, card)| Affordance {
            index,
            case_id: card.entry.case_id.to_string(),
            action: card.action,
        })
        .collect();
    let markup = ResultsTemplate { cards }.render()?;
    debug!(cases = payload.result.len(), "rendered result cards");
    Ok(ResultFragment {
        markup,
        affordances,
    })
}

/// Renders the weight sliders and works out what the thumbnail region should show.
pub fn render_query(payload: &ResultPayload) -> Result<QueryFragment, RenderError> {
    let rows = payload.query.iter().map(slider_row).collect();
    let markup = QueryTemplate { rows }.render()?;
    let thumbnail = match payload.image_path.as_deref() {
        Some(src) => ThumbnailUpdate::Replace(ThumbnailTemplate { src }.render()?),
        None => ThumbnailUpdate::Keep,
    };
    debug!(terms = payload.query.len(), "rendered query terms");
    Ok(QueryFragment { markup, thumbnail })
}

fn slider_row(term: &QueryTerm) -> SliderRow<'_> {
    SliderRow {
        query: &term.query,
        value: term.weight.map(|weight| weight.to_string()).unwrap_or_default(),
    }
}

pub fn render_fragments(payload: &ResultPayload) -> Result<Fragments, RenderError> {
    let results = render_results(payload)?;
    let query = render_query(payload)?;
    Ok(Fragments {
        result: results.markup,
        queryset: query.markup,
        thumbnail: match query.thumbnail {
            ThumbnailUpdate::Replace(markup) => Some(markup),
            ThumbnailUpdate::Keep => None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case(id: &str, name: &str) -> CaseEntry {
        CaseEntry {
            case_id: id.into(),
            name: name.into(),
            similarity: Scalar::Float(0.9),
            web_url: "u".into(),
            image_path: "p".into(),
            entry: "e".into(),
            category: "c".into(),
            topic: "t".into(),
        }
    }

    fn payload_with(flags: &[i64]) -> ResultPayload {
        ResultPayload {
            result: flags
                .iter()
                .enumerate()
                .map(|(i, _)| sample_case(&format!("case-{i}"), &format!("Case {i}")))
                .collect(),
            selected: flags.iter().map(|flag| Scalar::Int(*flag)).collect(),
            ..ResultPayload::default()
        }
    }

    #[test]
    fn selected_case_renders_unlike() {
        let payload = ResultPayload {
            result: vec![sample_case("a", "X")],
            selected: vec![Scalar::Int(1)],
            ..ResultPayload::default()
        };
        let fragment = render_results(&payload).unwrap();
        assert_eq!(fragment.markup.matches(r#"class="case""#).count(), 1);
        assert!(fragment.markup.contains(r#"<p class="case-title">X</p>"#));
        assert!(fragment.markup.contains("Score: 0.9"));
        assert!(fragment.markup.contains(r#"data-caseid="a""#));
        assert!(fragment.markup.contains("Unlike"));
        assert!(!fragment.markup.contains("&#x2661; Like"));
        assert_eq!(
            fragment.affordances,
            vec![Affordance {
                index: 0,
                case_id: "a".to_string(),
                action: ItemAction::Remove,
            }]
        );
    }

    #[test]
    fn unselected_case_renders_like() {
        let payload = ResultPayload {
            result: vec![sample_case("a", "X")],
            selected: vec![Scalar::Int(0)],
            ..ResultPayload::default()
        };
        let fragment = render_results(&payload).unwrap();
        assert!(fragment.markup.contains(r#"<span class="plus" data-action="add" data-caseid="a">"#));
        assert!(!fragment.markup.contains("Unlike"));
        assert_eq!(fragment.affordances[0].action, ItemAction::Add);
    }

    #[test]
    fn card_carries_link_image_entry_and_tags() {
        let payload = payload_with(&[0]);
        let markup = render_results(&payload).unwrap().markup;
        assert!(markup.contains(r#"<a href="u"><img src="p"></a>"#));
        assert!(markup.contains(r#"<p class="entry">e</p>"#));
        assert!(markup.contains(r#"<span class="tag"># c</span>"#));
        assert!(markup.contains(r#"<span class="tag"># t</span>"#));
    }

    #[test]
    fn card_count_and_affordances_follow_flags() {
        let flags = [1, 0, 0, 1, 1, 0];
        let payload = payload_with(&flags);
        let fragment = render_results(&payload).unwrap();
        assert_eq!(
            fragment.markup.matches(r#"<div class="case">"#).count(),
            flags.len()
        );
        assert_eq!(fragment.affordances.len(), flags.len());
        for (affordance, flag) in fragment.affordances.iter().zip(flags) {
            let expected = if flag == 1 {
                ItemAction::Remove
            } else {
                ItemAction::Add
            };
            assert_eq!(affordance.action, expected, "case {}", affordance.index);
        }
        assert_eq!(fragment.markup.matches("Unlike</span>").count(), 3);
        assert_eq!(fragment.markup.matches("&#x2661; Like</span>").count(), 3);
    }

    #[test]
    fn rendering_is_deterministic() {
        let payload = payload_with(&[1, 0, 1]);
        let first = render_fragments(&payload).unwrap();
        let second = render_fragments(&payload).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn markup_escapes_payload_text() {
        let mut payload = payload_with(&[0]);
        payload.result[0].name = "<script>alert(1)</script>".into();
        let markup = render_results(&payload).unwrap().markup;
        assert!(!markup.contains("<script>"));
        assert!(markup.contains("&lt;script&gt;"));
    }

    #[test]
    fn missing_fields_render_as_blank_text() {
        let payload = ResultPayload {
            result: vec![CaseEntry::default()],
            ..ResultPayload::default()
        };
        let fragment = render_results(&payload).unwrap();
        assert!(fragment.markup.contains(r#"<p class="case-title"></p>"#));
        assert!(fragment.markup.contains("Score: </span>"));
        assert_eq!(fragment.affordances[0].case_id, "");
        assert_eq!(fragment.affordances[0].action, ItemAction::Add);
    }

    #[test]
    fn query_terms_render_indexed_sliders() {
        let payload = ResultPayload {
            query: vec![
                QueryTerm {
                    query: "red brick".into(),
                    weight: Some(0.25),
                },
                QueryTerm {
                    query: "courtyard".into(),
                    weight: Some(0.75),
                },
            ],
            ..ResultPayload::default()
        };
        let fragment = render_query(&payload).unwrap();
        assert!(fragment.markup.contains(r#"<p class="query-content">red brick</p>"#));
        assert!(fragment.markup.contains(
            r#"<input type="range" min="0" max="1" step="0.01" value="0.25" class="slider" id="slider0">"#
        ));
        assert!(fragment.markup.contains(r#"value="0.75" class="slider" id="slider1""#));
        assert_eq!(fragment.thumbnail, ThumbnailUpdate::Keep);
    }

    #[test]
    fn image_path_replaces_thumbnail() {
        let payload = ResultPayload {
            image_path: Some("temp-upload.png".to_string()),
            ..ResultPayload::default()
        };
        let fragment = render_query(&payload).unwrap();
        assert_eq!(
            fragment.thumbnail,
            ThumbnailUpdate::Replace(r#"<img src="temp-upload.png">"#.to_string())
        );
        assert_eq!(
            render_fragments(&payload).unwrap().thumbnail.as_deref(),
            Some(r#"<img src="temp-upload.png">"#)
        );
    }

    #[test]
    fn action_names_round_trip_through_parse() {
        for action in [ItemAction::Add, ItemAction::Remove] {
            assert_eq!(ItemAction::parse(&action.to_string()), Some(action));
        }
        assert_eq!(ItemAction::parse("unlike"), Some(ItemAction::Remove));
        assert_eq!(ItemAction::parse("toggle"), None);
    }
}
