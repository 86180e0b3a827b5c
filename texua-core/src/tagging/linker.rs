//! Linking structure leaves to marked content by fuzzy text matching.
//!
//! Each leaf element claims the MCIDs whose extracted text best matches
//! its semantic text. The algorithm is small and deterministic on purpose:
//! tests pin the score function and the 0.3 threshold, and swapping in a
//! fuzzy-matching library would make the behaviour version-dependent.

use super::content_marks::MarkedContentEntry;
use super::structure::{LeafBinding, StructKid, StructTree};

const MATCH_THRESHOLD: f64 = 0.3;

/// Inverse ownership: for every page, one slot per MCID holding the arena
/// index of the owning element. Dense so the parent-tree builder can index
/// it directly.
#[derive(Debug, Default)]
pub struct Ownership {
    pages: Vec<Vec<Option<usize>>>,
}

impl Ownership {
    fn from_page_sizes(pages: &[Vec<MarkedContentEntry>]) -> Self {
        Self {
            pages: pages.iter().map(|marks| vec![None; marks.len()]).collect(),
        }
    }

    pub fn owner(&self, page: usize, mcid: u32) -> Option<usize> {
        self.pages.get(page)?.get(mcid as usize).copied()?
    }

    pub fn page_len(&self, page: usize) -> usize {
        self.pages.get(page).map(Vec::len).unwrap_or(0)
    }

    fn claim(&mut self, page: usize, mcid: u32, element: usize) {
        if let Some(slot) = self
            .pages
            .get_mut(page)
            .and_then(|p| p.get_mut(mcid as usize))
        {
            *slot = Some(element);
        }
    }

    fn is_claimed(&self, page: usize, mcid: u32) -> bool {
        self.owner(page, mcid).is_some()
    }
}

/// Normalise text for matching: lowercase, whitespace runs collapsed.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score how well `needle` matches `haystack`, in `[0, 1]`.
///
/// Exact match scores 1; substring containment scores the length ratio;
/// anything else scores the word-set overlap.
pub fn match_score(needle: &str, haystack: &str) -> f64 {
    if needle == haystack {
        return 1.0;
    }
    if needle.is_empty() || haystack.is_empty() {
        return 0.0;
    }
    if needle.contains(haystack) || haystack.contains(needle) {
        let shorter = needle.len().min(haystack.len());
        let longer = needle.len().max(haystack.len());
        return shorter as f64 / longer as f64;
    }
    let needle_words: std::collections::HashSet<&str> = needle.split(' ').collect();
    let haystack_words: std::collections::HashSet<&str> = haystack.split(' ').collect();
    let overlap = needle_words.intersection(&haystack_words).count();
    overlap as f64 / needle_words.len().max(haystack_words.len()) as f64
}

/// Attach MCRs to leaf elements and return the inverse ownership map.
///
/// Leaves are processed in tree order and MCIDs scanned in page+position
/// order, so a leaf that claims several MCIDs gets them in reading order.
/// A leaf with no match above threshold keeps an empty `/K`; that is not
/// an error.
pub fn link_structure(
    tree: &mut StructTree,
    leaves: &[LeafBinding],
    pages: &[Vec<MarkedContentEntry>],
) -> Ownership {
    let mut ownership = Ownership::from_page_sizes(pages);

    // Normalised MCID texts, flattened in page order.
    let haystacks: Vec<(usize, u32, String)> = pages
        .iter()
        .enumerate()
        .flat_map(|(page, marks)| {
            marks
                .iter()
                .map(move |mark| (page, mark.mcid, normalize(&mark.text)))
        })
        .collect();

    for leaf in leaves {
        let needle = normalize(&leaf.text);
        if needle.is_empty() {
            continue;
        }

        for (page, mcid, haystack) in &haystacks {
            if ownership.is_claimed(*page, *mcid) || haystack.is_empty() {
                continue;
            }
            if match_score(&needle, haystack) > MATCH_THRESHOLD {
                tree.get_mut(leaf.element).kids.push(StructKid::Mcr {
                    page: *page,
                    mcid: *mcid,
                });
                ownership.claim(*page, *mcid, leaf.element);
            }
        }
    }

    ownership
}
