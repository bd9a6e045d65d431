//! Typed view of the course listing markup.
//!
//! Both the validator and the extractor work on [`ListingSnapshot`], never on
//! live DOM nodes. A snapshot is produced either inside the browser by
//! [`snapshot_script`] or offline from saved HTML by [`ListingSnapshot::from_html`];
//! the two adapters walk the markup identically.
//!
//! Expected shape:
//!
//! ```text
//! #listaHorarios
//!   > li                      one group per item
//!       .tituloDoTipo         group title
//!       table > tbody > tr    header row, date rows (opening th), course rows (td)
//! ```

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Root listing container.
pub const LISTING_SELECTOR: &str = "#listaHorarios";
/// Title marker inside each group.
pub const TITLE_SELECTOR: &str = ".tituloDoTipo";

// Static selectors for parsing - compiled once
static LISTING: LazyLock<Selector> = LazyLock::new(|| Selector::parse(LISTING_SELECTOR).unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse(TITLE_SELECTOR).unwrap());
static TABLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static HEADER_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static DATA_CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// All groups found under the listing container, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub groups: Vec<GroupNode>,
}

/// One `li` of the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    /// Text of the title marker; `None` when the marker is missing
    pub title: Option<String>,
    pub table: Option<TableNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNode {
    /// Rows of the table body; `None` when the table has no `tbody`
    pub body: Option<Vec<RowNode>>,
}

/// A table row as ordered cell texts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowNode {
    /// Texts of the `th` cells. Empty unless the row's first element is a
    /// `th`, so a `th` further along never turns a course row into a header.
    #[serde(default)]
    pub headers: Vec<String>,
    /// The `td` cells
    #[serde(default)]
    pub cells: Vec<CellNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellNode {
    pub text: String,
    /// Text of the first link inside the cell, if any
    pub link: Option<String>,
}

impl RowNode {
    pub fn first_header(&self) -> Option<&str> {
        self.headers.first().map(String::as_str)
    }
}

impl ListingSnapshot {
    /// Builds a snapshot from a saved copy of the listing page.
    ///
    /// Returns `None` when the listing container is absent.
    pub fn from_html(html: &str) -> Option<Self> {
        let document = Html::parse_document(html);
        let root = document.select(&LISTING).next()?;

        let groups = root
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "li")
            .map(|li| parse_group(&li))
            .collect();

        Some(Self { groups })
    }

    pub fn row_count(&self) -> usize {
        self.groups
            .iter()
            .filter_map(|g| g.table.as_ref())
            .filter_map(|t| t.body.as_ref())
            .map(Vec::len)
            .sum()
    }
}

fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn parse_group(li: &ElementRef) -> GroupNode {
    let title = li.select(&TITLE).next().map(|el| text_of(&el));
    let table = li.select(&TABLE).next().map(|table| TableNode {
        body: table
            .select(&TBODY)
            .next()
            .map(|tbody| tbody.select(&ROW).map(|tr| parse_row(&tr)).collect()),
    });

    GroupNode { title, table }
}

fn parse_row(tr: &ElementRef) -> RowNode {
    let opens_with_header = tr
        .children()
        .filter_map(ElementRef::wrap)
        .next()
        .is_some_and(|el| el.value().name() == "th");

    RowNode {
        headers: if opens_with_header {
            tr.select(&HEADER_CELL).map(|th| text_of(&th)).collect()
        } else {
            Vec::new()
        },
        cells: tr
            .select(&DATA_CELL)
            .map(|td| CellNode {
                text: text_of(&td),
                link: td.select(&LINK).next().map(|a| text_of(&a)),
            })
            .collect(),
    }
}

/// JavaScript that serializes the listing of the live page into the same
/// shape as [`ListingSnapshot`]. Evaluates to a JSON string (`"null"` when
/// the container is missing) that decodes as `Option<ListingSnapshot>`.
///
/// When `frame_selector` is given the listing is read from that frame's
/// document, otherwise from the top-level document.
pub fn snapshot_script(frame_selector: Option<&str>) -> String {
    // serde_json string encoding doubles as JS string-literal quoting
    let frame = frame_selector
        .map(|s| serde_json::Value::from(s).to_string())
        .unwrap_or_else(|| "null".to_string());
    let listing = serde_json::Value::from(LISTING_SELECTOR).to_string();
    let title = serde_json::Value::from(TITLE_SELECTOR).to_string();

    format!(
        r#"(() => {{
    const frameSelector = {frame};
    let doc = document;
    if (frameSelector !== null) {{
        const frame = document.querySelector(frameSelector);
        if (!frame || !frame.contentDocument) {{
            throw new Error('frame ' + frameSelector + ' is not accessible');
        }}
        doc = frame.contentDocument;
    }}
    const root = doc.querySelector({listing});
    if (!root) {{
        return JSON.stringify(null);
    }}
    const text = (el) => (el && el.textContent ? el.textContent.trim() : '');
    const groups = Array.from(root.children)
        .filter((el) => el.tagName === 'LI')
        .map((li) => {{
            const titleEl = li.querySelector({title});
            const table = li.querySelector('table');
            let tableNode = null;
            if (table) {{
                const tbody = table.querySelector('tbody');
                tableNode = {{
                    body: tbody
                        ? Array.from(tbody.querySelectorAll('tr')).map((tr) => ({{
                              headers:
                                  tr.firstElementChild && tr.firstElementChild.tagName === 'TH'
                                      ? Array.from(tr.querySelectorAll('th')).map(text)
                                      : [],
                              cells: Array.from(tr.querySelectorAll('td')).map((td) => {{
                                  const a = td.querySelector('a');
                                  return {{ text: text(td), link: a ? text(a) : null }};
                              }}),
                          }}))
                        : null,
                }};
            }}
            return {{ title: titleEl ? text(titleEl) : null, table: tableNode }};
        }});
    return JSON.stringify({{ groups }});
}})()"#
    )
}


#[cfg(test)]
mod tests {
    use super::fixtures::LISTING_PAGE;
    use super::*;

    #[test]
    fn test_from_html_builds_groups_in_order() {
        let snapshot = ListingSnapshot::from_html(LISTING_PAGE).unwrap();
        let titles: Vec<_> = snapshot
            .groups
            .iter()
            .map(|g| g.title.clone().unwrap())
            .collect();

        assert_eq!(titles, vec!["Oficinas", "Palestras"]);
        assert_eq!(snapshot.row_count(), 3 + 5);
    }

    #[test]
    fn test_from_html_captures_cells_and_links() {
        let snapshot = ListingSnapshot::from_html(LISTING_PAGE).unwrap();
        let rows = snapshot.groups[0]
            .table
            .as_ref()
            .and_then(|t| t.body.as_ref())
            .unwrap();

        assert_eq!(rows[0].headers.len(), 4);
        assert_eq!(rows[1].first_header(), Some("01/12/2025 - Segunda-feira"));

        let course = &rows[2];
        assert!(course.headers.is_empty());
        assert_eq!(course.cells.len(), 4);
        assert_eq!(course.cells[0].link.as_deref(), Some("( 10 ) -   Robotics"));
        assert_eq!(course.cells[1].text, "14:00 às 16:00");
        assert_eq!(course.cells[3].link, None);
    }

    #[test]
    fn test_trailing_header_cell_keeps_row_a_course() {
        let html = r#"<ul id="listaHorarios"><li><table><tbody>
            <tr><td><a>(9) - Late</a></td><th>01/12/2025</th><td>08:00 às 09:00</td><td>5</td><td>1</td></tr>
            <tr>
              <th>02/12/2025 - Terça-feira</th>
            </tr>
        </tbody></table></li></ul>"#;
        let snapshot = ListingSnapshot::from_html(html).unwrap();
        let rows = snapshot.groups[0]
            .table
            .as_ref()
            .and_then(|t| t.body.as_ref())
            .unwrap();

        assert_eq!(rows[0].first_header(), None);
        assert_eq!(rows[0].cells.len(), 4);
        // Whitespace before the first cell does not count as an element
        assert_eq!(rows[1].first_header(), Some("02/12/2025 - Terça-feira"));
    }

    #[test]
    fn test_from_html_without_listing() {
        assert_eq!(ListingSnapshot::from_html("<html><body></body></html>"), None);
    }

    #[test]
    fn test_group_without_title_or_table() {
        let html = r#"<ul id="listaHorarios"><li><p>nothing here</p></li></ul>"#;
        let snapshot = ListingSnapshot::from_html(html).unwrap();

        assert_eq!(snapshot.groups, vec![GroupNode::default()]);
    }

    #[test]
    fn test_decode_snapshot_matches_script_output_shape() {
        let raw = r#"{"groups":[{"title":"Oficinas","table":{"body":[
            {"headers":["01/12/2025 - Segunda-feira"],"cells":[]},
            {"headers":[],"cells":[{"text":"(10) - Robotics","link":"(10) - Robotics"}]}
        ]}}]}"#;

        let snapshot: Option<ListingSnapshot> = serde_json::from_str(raw).unwrap();
        let snapshot = snapshot.unwrap();
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(snapshot.row_count(), 2);

        let missing: Option<ListingSnapshot> = serde_json::from_str("null").unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_snapshot_script_quotes_selectors() {
        let script = snapshot_script(Some("#iframeAtividades"));
        assert!(script.contains(r##"const frameSelector = "#iframeAtividades";"##));
        assert!(script.contains(r##"doc.querySelector("#listaHorarios")"##));

        assert!(script.contains("tr.firstElementChild.tagName === 'TH'"));

        let top_level = snapshot_script(None);
        assert!(top_level.contains("const frameSelector = null;"));
    }
}
