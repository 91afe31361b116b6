//! Prompts for page-by-page takeoff extraction

use crate::rag::types::Trade;
use crate::takeoff::table::{NO_ELEMENTS, TABLE_COLUMNS};

/// Build the prompt for extracting elements from a single page
pub fn build_page_prompt(
    page_text: &str,
    page_number: u32,
    total_pages: usize,
    trade: Trade,
) -> String {
    format!(
        r#"You are a quantity surveyor extracting {trade} elements from an engineering drawing set.

EXTRACTION MODE: Page-by-Page Extraction

Processing Page {page_number} of {total_pages}

CRITICAL INSTRUCTIONS:
1. Extract ONLY {trade} elements that are CLEARLY DEFINED on this page
2. Focus ONLY on elements shown on page {page_number}
3. Include complete specifications for each element
4. If an element spans multiple pages, extract it on the page where it is primarily defined

IMPORTANT - DO NOT FORCE EXTRACTION:
- If this page contains NO {trade} elements (e.g., title page, notes, general details), return "{no_elements}"
- Only extract elements that have clear specifications (dimensions, reinforcement, concrete grade, etc.)
- DO NOT extract placeholder text, labels, or non-element information
- DO NOT make up or guess element data
- It is PERFECTLY ACCEPTABLE to return zero elements if the page has none

OUTPUT FORMAT:
Emit a pipe-delimited table with EXACTLY this header row:
{header}

Rules for rows:
- One row per element, cells in header order
- Use "-" for any unknown cell
- Dimensions in integer millimeters
- QTY as a plain count (e.g. "4") or linear meters (e.g. "120m")
- Reinforcement as bar@spacing (e.g. "N16@200") or fabric type (e.g. "SL92")
- COVER as integer millimeters when a single value applies

OUTPUT FORMAT FOR EMPTY PAGES:
If NO valid {trade} elements with schedules/tables/dimensions exist on this page, respond with ONLY:
{no_elements}

Do NOT output table headers for empty pages - just respond "{no_elements}" to save tokens.

PAGE {page_number} CONTENT:
{page_text}
"#,
        trade = trade.as_str(),
        page_number = page_number,
        total_pages = total_pages,
        header = TABLE_COLUMNS.join("|"),
        no_elements = NO_ELEMENTS,
        page_text = page_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_prompt_contains_contract() {
        let prompt = build_page_prompt("SLAB SCHEDULE ...", 3, 5, Trade::Concrete);
        assert!(prompt.contains("Page 3 of 5"));
        assert!(prompt.contains("ID|TYPE|PAGE|"));
        assert!(prompt.contains("NO ELEMENTS"));
        assert!(prompt.contains("SLAB SCHEDULE"));
        assert!(prompt.contains("concrete"));
    }
}
