//! SearchIndex: inverted index over lower-cased artist / album / title.
//!
//! Backed by a tantivy directory. Documents are keyed by the raw `path`
//! term; every text field is also stored so hits can be shown even when the
//! PrimaryStore row is momentarily missing.
//!
//! Writes are staged in the tantivy writer and become visible to readers on
//! [`SearchIndex::commit`]. Callers serialise writes through the catalog's
//! mutation lock; the writer mutex here only provides interior mutability.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use tantivy::collector::{DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{AllQuery, BooleanQuery, FuzzyTermQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::tokenizer::TokenStream;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};

use crate::error::{Result, TunedexError};

/// Edit distance tolerated per query term: one insertion, deletion or
/// substitution. A transposition counts as two.
pub const FUZZY_DISTANCE: u8 = 1;

const FIELD_PATH: &str = "path";
const FIELD_ARTIST: &str = "artist";
const FIELD_ALBUM: &str = "album";
const FIELD_TITLE: &str = "title";

/// One ranked match, carrying the index's stored (lower-cased) fields.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub path: String,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub score: f32,
}

pub struct SearchIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    f_path: Field,
    f_artist: Field,
    f_album: Field,
    f_title: Field,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(FIELD_PATH, STRING | STORED);
    builder.add_text_field(FIELD_ARTIST, TEXT | STORED);
    builder.add_text_field(FIELD_ALBUM, TEXT | STORED);
    builder.add_text_field(FIELD_TITLE, TEXT | STORED);
    builder.build()
}

fn schema_is_current(schema: &Schema) -> bool {
    [FIELD_PATH, FIELD_ARTIST, FIELD_ALBUM, FIELD_TITLE]
        .iter()
        .all(|name| schema.get_field(name).is_ok())
}

impl SearchIndex {
    /// Open the index in `dir`, or create a fresh one.
    ///
    /// Returns `true` alongside the index when it had to be created, which
    /// tells the caller a rebuild is needed. An unreadable or outdated index
    /// directory is wiped and recreated.
    pub fn open_or_create(dir: &Path, writer_heap_bytes: usize) -> Result<(Self, bool)> {
        fs::create_dir_all(dir)?;

        let existing = {
            let mmap = MmapDirectory::open(dir)?;
            if Index::exists(&mmap).map_err(tantivy::TantivyError::from)? {
                match Index::open(mmap) {
                    Ok(index) if schema_is_current(&index.schema()) => Some(index),
                    Ok(_) => {
                        tracing::warn!("[Index] Schema at {} is outdated, recreating", dir.display());
                        None
                    }
                    Err(e) => {
                        tracing::warn!("[Index] Failed to open {} ({}), recreating", dir.display(), e);
                        None
                    }
                }
            } else {
                None
            }
        };

        let (index, created) = match existing {
            Some(index) => (index, false),
            None => {
                fs::remove_dir_all(dir)?;
                fs::create_dir_all(dir)?;
                (Index::create_in_dir(dir, build_schema())?, true)
            }
        };

        let schema = index.schema();
        let f_path = schema.get_field(FIELD_PATH)?;
        let f_artist = schema.get_field(FIELD_ARTIST)?;
        let f_album = schema.get_field(FIELD_ALBUM)?;
        let f_title = schema.get_field(FIELD_TITLE)?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let writer: IndexWriter = index.writer(writer_heap_bytes)?;

        if created {
            tracing::info!("[Index] Created new search index at {}", dir.display());
        } else {
            tracing::info!("[Index] Loaded existing search index at {}", dir.display());
        }

        Ok((
            Self {
                index,
                reader,
                writer: Mutex::new(writer),
                f_path,
                f_artist,
                f_album,
                f_title,
            },
            created,
        ))
    }

    /// Stage a document for `path`, replacing any previous one.
    pub fn add_or_replace(&self, path: &str, artist: &str, album: &str, title: &str) -> Result<()> {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.f_path, path);
        doc.add_text(self.f_artist, artist.to_lowercase());
        doc.add_text(self.f_album, album.to_lowercase());
        doc.add_text(self.f_title, title.to_lowercase());

        let writer = self.writer.lock().map_err(|_| TunedexError::poisoned())?;
        writer.delete_term(Term::from_field_text(self.f_path, path));
        writer.add_document(doc)?;
        Ok(())
    }

    /// Stage removal of the document for `path` (no-op if absent).
    pub fn delete(&self, path: &str) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| TunedexError::poisoned())?;
        writer.delete_term(Term::from_field_text(self.f_path, path));
        Ok(())
    }

    /// Stage removal of every document.
    pub fn delete_all(&self) -> Result<()> {
        let writer = self.writer.lock().map_err(|_| TunedexError::poisoned())?;
        writer.delete_all_documents()?;
        Ok(())
    }

    /// Persist staged changes and make them visible to searches.
    pub fn commit(&self) -> Result<()> {
        {
            let mut writer = self.writer.lock().map_err(|_| TunedexError::poisoned())?;
            writer.commit()?;
        }
        self.reader.reload()?;
        Ok(())
    }

    /// Drop staged, uncommitted changes.
    pub fn rollback(&self) -> Result<()> {
        let mut writer = self.writer.lock().map_err(|_| TunedexError::poisoned())?;
        writer.rollback()?;
        Ok(())
    }

    pub fn num_docs(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Every indexed path (diagnostics and consistency checks).
    pub fn all_paths(&self) -> Result<HashSet<String>> {
        let searcher = self.reader.searcher();
        let addresses = searcher.search(&AllQuery, &DocSetCollector)?;
        let mut paths = HashSet::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            paths.insert(self.stored_text(&doc, self.f_path));
        }
        Ok(paths)
    }

    /// Ranked fuzzy search over artist, album and title.
    ///
    /// Each query token must match at least one field, exactly or within
    /// [`FUZZY_DISTANCE`] edits. Exact matches add BM25 weight on top of the
    /// fuzzy match, so they rank first.
    pub fn query(&self, text: &str, limit: usize) -> Result<Vec<IndexHit>> {
        if text.trim().is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let tokens = self.tokenize(text)?;
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let fields = [self.f_artist, self.f_album, self.f_title];
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(tokens.len());
        for token in &tokens {
            let mut alternatives: Vec<(Occur, Box<dyn Query>)> = Vec::with_capacity(fields.len() * 2);
            for field in fields {
                let term = Term::from_field_text(field, token);
                alternatives.push((
                    Occur::Should,
                    Box::new(TermQuery::new(term.clone(), IndexRecordOption::WithFreqs)),
                ));
                alternatives.push((
                    Occur::Should,
                    Box::new(FuzzyTermQuery::new(term, FUZZY_DISTANCE, false)),
                ));
            }
            clauses.push((Occur::Must, Box::new(BooleanQuery::new(alternatives))));
        }
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(IndexHit {
                path: self.stored_text(&doc, self.f_path),
                artist: self.stored_text(&doc, self.f_artist),
                album: self.stored_text(&doc, self.f_album),
                title: self.stored_text(&doc, self.f_title),
                score,
            });
        }
        Ok(hits)
    }

    /// Split a raw query with the same analyzer the text fields use.
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        let mut analyzer = self.index.tokenizer_for_field(self.f_artist)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens: Vec<String> = Vec::new();
        while stream.advance() {
            let token = stream.token().text.clone();
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }

    fn stored_text(&self, doc: &TantivyDocument, field: Field) -> String {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }
}
