use crate::enrich::images::FetchedImage;
use crate::llm::Part;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const MAX_TITLE_CHARS: usize = 139;
const GLUED_TAG_MIN_CHARS: usize = 12;

static GLUED_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        "(bathroom|kitchen|chrome|modern|vintage|rustic|wooden|metal|glass|ceramic|plastic|\
         waterfall|single|double|pull|down|handle|lever|mixer|basin|sink|lavatory|vanity|\
         counter|wall|mounted|floor|standing|tall|short|wide|narrow|round|square|oval|rectangular)",
    )
    .expect("glued word pattern")
});

pub const COPY_PROMPT: &str = r#"You write marketplace listings. Follow these formatting rules exactly.

Look at the product image and write listing copy for it.

1. TITLE (at most 140 characters)
   Two or three keyword-rich phrases separated by " | ".
   Start with the most distinctive feature of the product (design, symbol, pattern)
   in 2-4 words, then material or colour, then the generic product type.
   Good: "Tall Gold Vintage Faucet | Waterfall Spout Bathroom Fixture | Single Handle Basin Tap"
   Bad:  "Metal Bracelet | Snake Head Design" (generic type first)

2. DESCRIPTION
   Never use asterisks or bold text. Never use "*" or "-" bullets. Plain text and emoji only.
   Structure:
   - A hook sentence, a blank line, an emoji headline, a blank line, two or three emotional sentences.
   - Two paragraphs, each opening with an emoji headline.
   - "✨ Features" followed by 5-6 lines starting with "✅ ".
   - "❓ FAQ" followed by 5-6 pairs: questions start with "➡️ ", answers with "🔹 ",
     one blank line between pairs.
   One blank line between sections, none directly after a section heading.
   Tone: simple, sales-oriented, easy to read.

3. TAGS (13 tags)
   Comma-separated with no space after commas, all lowercase, English only,
   at most 3 words per tag, words inside a tag separated by spaces
   ("bathroom faucet", never "bathroomfaucet").
   - About 8 direct names and synonyms; the first tag is the most obvious name.
   - About 3 attribute tags combining material, colour or style with the object.
   - About 2 alternative descriptions of function or use.
   No generic terms ("gift", "home decor", "shop"), no lone adjectives, no quantities.

Answer in exactly this layout:
TITLE: [phrase 1] | [phrase 2]

DESCRIPTION:
[description]

TAGS: tag1,tag2,tag3,tag4,tag5,tag6,tag7,tag8,tag9,tag10,tag11,tag12,tag13
"#;

/// Generated listing text for one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingCopy {
    pub title: String,
    pub description: String,
    pub tags: String,
}

pub fn copy_request(image: &FetchedImage) -> Vec<Part> {
    vec![
        Part::text(COPY_PROMPT),
        Part::InlineImage {
            mime_type: image.mime_type.clone(),
            data: image.bytes.clone(),
        },
    ]
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Other,
    Description,
}

/// Extracts the `TITLE:` / `DESCRIPTION:` / `TAGS:` sections. Returns `None`
/// when neither a title nor a description could be found.
pub fn parse_listing_copy(text: &str) -> Option<ListingCopy> {
    let mut title = String::new();
    let mut description = String::new();
    let mut tags = String::new();
    let mut section = Section::Other;

    for line in text.lines() {
        let clean = line.trim();
        let marker = clean.trim_start_matches(['*', '#', ' ']).replace("**", "");
        if let Some(rest) = marker.strip_prefix("TITLE:") {
            title = rest.trim().to_string();
            section = Section::Other;
        } else if marker.starts_with("DESCRIPTION:") {
            description.clear();
            section = Section::Description;
        } else if let Some(rest) = marker.strip_prefix("TAGS:") {
            tags = rest.trim().to_string();
            section = Section::Other;
        } else if section == Section::Description {
            if !clean.is_empty() {
                description.push_str(clean);
            }
            description.push('\n');
        }
    }

    let title: String = title.chars().take(MAX_TITLE_CHARS).collect();
    let title = title.trim().to_string();
    let description = clean_description(&description);
    if title.is_empty() && description.is_empty() {
        return None;
    }
    Some(ListingCopy {
        title,
        description,
        tags: normalize_tags(&tags),
    })
}

fn clean_description(raw: &str) -> String {
    let mut text = raw.replace("**", "").replace("* ", " ").replace(" *", " ");
    while text.contains("\n\n\n") {
        text = text.replace("\n\n\n", "\n\n");
    }
    text.trim().to_string()
}

/// Lowercases, removes spaces around commas and splits long glued tags on
/// common product words.
pub fn normalize_tags(raw: &str) -> String {
    let lowered = raw.replace(", ", ",").replace(" ,", ",").to_lowercase();
    lowered
        .trim()
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            if tag.chars().count() > GLUED_TAG_MIN_CHARS && !tag.contains(' ') {
                let spaced = GLUED_WORDS.replace_all(tag, "$1 ");
                spaced.split_whitespace().collect::<Vec<_>>().join(" ")
            } else {
                tag.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "TITLE: Tall Gold Faucet | Waterfall Spout Bathroom Fixture\n\
\n\
DESCRIPTION:\n\
Transform your bathroom with **this** faucet.\n\
\n\
\n\
\n\
👍 Elevate Your Style\n\
* Solid brass body\n\
\n\
TAGS: Gold Faucet, bathroomfaucet ,waterfallfaucettall,tap\n";

    #[test]
    fn parses_sections_and_cleans_markup() {
        let copy = parse_listing_copy(REPLY).expect("copy");
        assert_eq!(copy.title, "Tall Gold Faucet | Waterfall Spout Bathroom Fixture");
        assert!(copy.description.starts_with("Transform your bathroom with this faucet."));
        assert!(!copy.description.contains("**"));
        assert!(!copy.description.contains("\n\n\n"));
        assert!(copy.description.contains("👍 Elevate Your Style\n Solid brass body"));
        assert_eq!(copy.tags, "gold faucet,bathroom faucet,waterfall faucettall,tap");
    }

    #[test]
    fn long_glued_tags_are_split() {
        assert_eq!(
            normalize_tags("singlehandlebasinmixer,kitchenfaucet,ringset"),
            "single handle basin mixer,kitchen faucet,ringset"
        );
        assert_eq!(normalize_tags(""), "");
    }

    #[test]
    fn title_is_capped() {
        let long = format!("TITLE: {}\nDESCRIPTION:\nx\n", "a".repeat(200));
        let copy = parse_listing_copy(&long).expect("copy");
        assert_eq!(copy.title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn bold_section_markers_are_recognised() {
        let copy = parse_listing_copy("**TITLE:** Lamp\n**DESCRIPTION:**\nWarm light\n**TAGS:** lamp")
            .expect("copy");
        assert_eq!(copy.title, "Lamp");
        assert_eq!(copy.description, "Warm light");
        assert_eq!(copy.tags, "lamp");
    }

    #[test]
    fn reply_without_title_or_description_is_empty() {
        assert!(parse_listing_copy("I cannot see the image.").is_none());
        assert!(parse_listing_copy("TAGS: a,b").is_none());
    }
}
