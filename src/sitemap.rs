//! Two-level sitemap traversal.
//!
//! A sitemap index lists child sitemaps; only children whose `<loc>` contains
//! the configured marker (e.g. `article-sitemap`) are followed. Each child is
//! a `<urlset>` whose `<url><loc>` values become [`Candidate`]s.
//!
//! ```text
//! sitemap.xml (sitemapindex)
//! ├── article-sitemap1.xml (urlset) ──► candidates
//! ├── article-sitemap2.xml (urlset) ──► candidates
//! └── page-sitemap.xml                  (ignored, no marker)
//! ```
//!
//! A child that fails to download or parse is reported as an `Err` item on
//! the stream; its siblings are unaffected.

use crate::error::SitemapError;
use crate::fetch::Fetcher;
use crate::models::Candidate;
use futures::stream::{self, Stream, StreamExt};
use quick_xml::Reader;
use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use tracing::{debug, info, instrument};

/// Child sitemaps downloaded at once. `buffered` keeps their output in index order.
const CHILD_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapKind {
    Index,
    Urlset,
}

/// A parsed sitemap: one entry per `<sitemap>` or `<url>` element, holding
/// its `<loc>` text if it had one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapDoc {
    pub kind: SitemapKind,
    pub locs: Vec<Candidate>,
}

/// The candidates read from one child sitemap, in document order.
#[derive(Debug, Clone)]
pub struct SitemapBatch {
    pub sitemap_url: String,
    pub candidates: Vec<Candidate>,
}

/// Parse a sitemap index or urlset.
///
/// Namespaces are ignored; elements are matched on their local name.
/// Anything that is not well-formed XML with a `sitemapindex` or `urlset`
/// root is reported as [`SitemapError::Malformed`].
pub fn parse(url: &str, xml: &str) -> Result<SitemapDoc, SitemapError> {
    let malformed = |reason: String| SitemapError::Malformed {
        url: url.to_string(),
        reason,
    };

    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut kind = None;
    let mut locs = Vec::new();
    let mut entry: Option<Candidate> = None;
    let mut text: Option<String> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(format!("{e} at byte {}", reader.error_position())))?;

        match event {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                match stack.len() {
                    0 => {
                        if kind.is_some() {
                            return Err(malformed("multiple root elements".to_string()));
                        }
                        kind = Some(root_kind(&name).ok_or_else(|| {
                            malformed(format!(
                                "unexpected root element <{}>",
                                String::from_utf8_lossy(&name)
                            ))
                        })?);
                    }
                    1 if is_entry(&name) => entry = Some(None),
                    2 if name == b"loc" && entry.is_some() => text = Some(String::new()),
                    _ => {}
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                let name = e.local_name().as_ref().to_vec();
                match stack.len() {
                    0 => {
                        if kind.is_some() {
                            return Err(malformed("multiple root elements".to_string()));
                        }
                        kind = Some(root_kind(&name).ok_or_else(|| {
                            malformed(format!(
                                "unexpected root element <{}>",
                                String::from_utf8_lossy(&name)
                            ))
                        })?);
                    }
                    1 if is_entry(&name) => locs.push(None),
                    2 if name == b"loc" => {
                        if let Some(slot) = entry.as_mut() {
                            *slot = Some(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Event::End(e) => {
                let name = e.local_name().as_ref().to_vec();
                match stack.pop() {
                    Some(open) if open == name => {}
                    Some(open) => {
                        return Err(malformed(format!(
                            "</{}> closes <{}>",
                            String::from_utf8_lossy(&name),
                            String::from_utf8_lossy(&open)
                        )));
                    }
                    None => return Err(malformed("unbalanced end tag".to_string())),
                }
                match stack.len() {
                    2 if name == b"loc" => {
                        if let (Some(raw), Some(slot)) = (text.take(), entry.as_mut()) {
                            let loc = unescape(&raw).map_err(|e| malformed(e.to_string()))?;
                            *slot = Some(loc.trim().to_string());
                        }
                    }
                    1 if is_entry(&name) => {
                        if let Some(loc) = entry.take() {
                            locs.push(loc);
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some(buf) = text.as_mut() {
                    buf.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Event::GeneralRef(e) => {
                if let Some(buf) = text.as_mut() {
                    buf.push('&');
                    buf.push_str(&String::from_utf8_lossy(&e));
                    buf.push(';');
                }
            }
            Event::CData(e) => {
                if let Some(buf) = text.as_mut() {
                    let raw = String::from_utf8_lossy(&e).into_owned();
                    buf.push_str(&escape(raw.as_str()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed("unexpected end of document".to_string()));
    }
    let kind = kind.ok_or_else(|| malformed("no root element".to_string()))?;
    Ok(SitemapDoc { kind, locs })
}

fn root_kind(name: &[u8]) -> Option<SitemapKind> {
    match name {
        b"sitemapindex" => Some(SitemapKind::Index),
        b"urlset" => Some(SitemapKind::Urlset),
        _ => None,
    }
}

fn is_entry(name: &[u8]) -> bool {
    name == b"sitemap" || name == b"url"
}

/// Walks a sitemap index down to article candidates.
#[derive(Debug)]
pub struct SitemapWalker<'a, F> {
    fetcher: &'a F,
    marker: String,
    skip_leading: usize,
}

impl<'a, F> SitemapWalker<'a, F>
where
    F: Fetcher,
{
    pub fn new(fetcher: &'a F, marker: impl Into<String>, skip_leading: usize) -> Self {
        Self {
            fetcher,
            marker: marker.into(),
            skip_leading,
        }
    }

    /// Child sitemaps listed in the index whose location contains the marker.
    #[instrument(level = "info", skip(self))]
    pub async fn child_sitemaps(&self, index_url: &str) -> Result<Vec<String>, SitemapError> {
        let page = self.fetcher.fetch(index_url).await?;
        let doc = parse(index_url, &page.body)?;
        if doc.kind != SitemapKind::Index {
            return Err(SitemapError::Malformed {
                url: index_url.to_string(),
                reason: "expected <sitemapindex>".to_string(),
            });
        }

        let total = doc.locs.len();
        let children: Vec<String> = doc
            .locs
            .into_iter()
            .flatten()
            .filter(|loc| loc.contains(self.marker.as_str()))
            .collect();
        info!(
            total,
            selected = children.len(),
            marker = %self.marker,
            "Read sitemap index"
        );
        Ok(children)
    }

    /// Candidates from one child sitemap, minus the leading entries to skip.
    #[instrument(level = "info", skip(self))]
    pub async fn candidates(&self, sitemap_url: &str) -> Result<Vec<Candidate>, SitemapError> {
        let page = self.fetcher.fetch(sitemap_url).await?;
        let doc = parse(sitemap_url, &page.body)?;
        if doc.kind != SitemapKind::Urlset {
            return Err(SitemapError::Malformed {
                url: sitemap_url.to_string(),
                reason: "expected <urlset>".to_string(),
            });
        }

        let candidates: Vec<Candidate> =
            doc.locs.into_iter().skip(self.skip_leading).collect();
        debug!(count = candidates.len(), "Read child sitemap");
        Ok(candidates)
    }

    /// Every candidate reachable from `index_url`, one batch per child sitemap.
    ///
    /// Batches come out in index order. A failure on the index itself yields a
    /// single `Err` and ends the stream.
    pub fn walk<'b>(
        &'b self,
        index_url: &'b str,
    ) -> impl Stream<Item = Result<SitemapBatch, SitemapError>> + 'b {
        stream::once(self.child_sitemaps(index_url)).flat_map(move |children| match children {
            Ok(children) => stream::iter(children)
                .map(move |sitemap_url| async move {
                    let candidates = self.candidates(&sitemap_url).await?;
                    Ok::<_, SitemapError>(SitemapBatch {
                        sitemap_url,
                        candidates,
                    })
                })
                .buffered(CHILD_CONCURRENCY)
                .left_stream(),
            Err(e) => stream::iter([Err(e)]).right_stream(),
        })
    }
}
