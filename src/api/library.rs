// kindle-core - Kindle e-book delivery client
// Copyright (C) 2025 kindle-core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Account library listing
//!
//! # API Endpoint
//! `GET {library}/FionaTodoListProxy/syncMetaData?item_count=1000`
//!
//! The response is XML:
//! ```xml
//! <response>
//!   <sync_time>2021-02-22T12:00:00+0000;softwareVersion:1184366692</sync_time>
//!   <add_update_list>
//!     <meta_data>
//!       <ASIN>B00ABC123</ASIN>
//!       <title pronunciation="...">A Title</title>
//!       <authors><author pronunciation="...">An Author</author></authors>
//!       <publishers><publisher>A Publisher</publisher></publishers>
//!       <publication_date>2014-01-01T00:00:00+0000</publication_date>
//!       <purchase_date>2021-02-01T10:00:00+0000</purchase_date>
//!       <cde_contenttype>EBOK</cde_contenttype>
//!       <content_type>application/x-mobipocket-ebook</content_type>
//!       <origins><origin><type>Purchase</type></origin></origins>
//!     </meta_data>
//!   </add_update_list>
//! </response>
//! ```
//!
//! Entries without an `ASIN` are dropped.

use crate::api::client::{insert_header, truncate, KindleClient};
use crate::error::{KindleError, Result};
use reqwest::header::{HeaderMap, ACCEPT_LANGUAGE, USER_AGENT};
use serde::{Deserialize, Serialize};

/// Content type tag of e-books in the library
pub const EBOOK_CONTENT_TYPE: &str = "EBOK";

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Options for a library listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryOptions {
    /// Maximum number of entries returned
    pub item_count: u32,
}

impl Default for LibraryOptions {
    fn default() -> Self {
        Self { item_count: 1000 }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// One title owned by the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryBook {
    /// Content id, usable with [`KindleClient::get_manifest`]
    pub asin: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default)]
    pub publishers: Vec<String>,

    #[serde(default)]
    pub publication_date: Option<String>,

    #[serde(default)]
    pub purchase_date: Option<String>,

    /// Store content tag, e.g. `EBOK` or `PDOC`
    #[serde(default)]
    pub cde_content_type: Option<String>,

    /// MIME-like content type
    #[serde(default)]
    pub content_type: Option<String>,

    /// How the title entered the library, e.g. `Purchase`
    #[serde(default)]
    pub origin_type: Option<String>,
}

impl LibraryBook {
    pub fn is_ebook(&self) -> bool {
        self.cde_content_type.as_deref() == Some(EBOOK_CONTENT_TYPE)
    }
}

/// Library listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    /// Opaque sync marker returned by the service
    #[serde(default)]
    pub sync_time: Option<String>,

    pub books: Vec<LibraryBook>,
}

impl Library {
    /// Parse a `syncMetaData` response body
    pub fn from_xml(body: &str) -> Result<Self> {
        let raw: RawResponse =
            quick_xml::de::from_str(body).map_err(|e| KindleError::LibraryParse(e.to_string()))?;

        let books = raw
            .add_update_list
            .map(|list| list.meta_data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(RawMetaData::into_book)
            .collect();

        Ok(Self {
            sync_time: raw.sync_time.and_then(XmlText::into_option),
            books,
        })
    }

    /// E-book entries only
    pub fn ebooks(&self) -> impl Iterator<Item = &LibraryBook> {
        self.books.iter().filter(|b| b.is_ebook())
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

/// Element text, ignoring any attributes
#[derive(Debug, Default, Deserialize)]
struct XmlText {
    #[serde(rename = "$text", default)]
    text: String,
}

impl XmlText {
    fn into_option(self) -> Option<String> {
        let text = self.text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    sync_time: Option<XmlText>,

    #[serde(default)]
    add_update_list: Option<RawAddUpdateList>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAddUpdateList {
    #[serde(default)]
    meta_data: Vec<RawMetaData>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuthors {
    #[serde(default)]
    author: Vec<XmlText>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPublishers {
    #[serde(default)]
    publisher: Vec<XmlText>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOrigin {
    #[serde(rename = "type", default)]
    origin_type: Option<XmlText>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOrigins {
    #[serde(default)]
    origin: Vec<RawOrigin>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetaData {
    #[serde(rename = "ASIN", default)]
    asin: Option<XmlText>,

    #[serde(default)]
    title: Option<XmlText>,

    #[serde(default)]
    authors: Option<RawAuthors>,

    #[serde(default)]
    publishers: Option<RawPublishers>,

    #[serde(default)]
    publication_date: Option<XmlText>,

    #[serde(default)]
    purchase_date: Option<XmlText>,

    #[serde(default)]
    cde_contenttype: Option<XmlText>,

    #[serde(default)]
    content_type: Option<XmlText>,

    #[serde(default)]
    origins: Option<RawOrigins>,
}

fn text_of(value: Option<XmlText>) -> Option<String> {
    value.and_then(XmlText::into_option)
}

fn texts_of(values: Vec<XmlText>) -> Vec<String> {
    values.into_iter().filter_map(XmlText::into_option).collect()
}

impl RawMetaData {
    fn into_book(self) -> Option<LibraryBook> {
        let asin = text_of(self.asin)?;
        Some(LibraryBook {
            asin,
            title: text_of(self.title),
            authors: self.authors.map(|a| texts_of(a.author)).unwrap_or_default(),
            publishers: self.publishers.map(|p| texts_of(p.publisher)).unwrap_or_default(),
            publication_date: text_of(self.publication_date),
            purchase_date: text_of(self.purchase_date),
            cde_content_type: text_of(self.cde_contenttype),
            content_type: text_of(self.content_type),
            origin_type: self
                .origins
                .and_then(|o| o.origin.into_iter().find_map(|o| text_of(o.origin_type))),
        })
    }
}

// ============================================================================
// API IMPLEMENTATION
// ============================================================================

impl KindleClient {
    /// List the titles owned by the account
    ///
    /// # Returns
    /// Every entry of the first page (up to 1000 items)
    ///
    /// # Errors
    /// `LibraryFetch` on a transport failure or non-success status,
    /// `LibraryParse` when the body is not a valid listing
    pub async fn get_library(&self) -> Result<Library> {
        self.get_library_with(&LibraryOptions::default()).await
    }

    /// List the titles owned by the account with explicit options
    pub async fn get_library_with(&self, options: &LibraryOptions) -> Result<Library> {
        let url = self.library_url("/FionaTodoListProxy/syncMetaData")?;

        let mut headers = HeaderMap::new();
        insert_header(&mut headers, USER_AGENT, &self.config().user_agent)?;
        let language = self.authenticator().language();
        if !language.is_empty() {
            insert_header(&mut headers, ACCEPT_LANGUAGE, language)?;
        }

        let item_count = options.item_count.to_string();
        let response = self
            .send(
                self.http()
                    .get(url)
                    .headers(headers)
                    .query(&[("item_count", item_count.as_str())]),
            )
            .await
            .map_err(|e| {
                let status = e.status();
                KindleError::LibraryFetch {
                    message: e.to_string(),
                    status,
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| KindleError::LibraryFetch {
            message: format!("Failed to read body: {}", e),
            status: Some(status.as_u16()),
        })?;

        if !status.is_success() {
            return Err(KindleError::LibraryFetch {
                message: format!("HTTP {}: {}", status, truncate(&body, 200)),
                status: Some(status.as_u16()),
            });
        }

        let library = Library::from_xml(&body)?;
        tracing::info!(
            books = library.books.len(),
            ebooks = library.ebooks().count(),
            "fetched library"
        );
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<response>
  <sync_time>2021-02-22T12:00:00+0000;softwareVersion:1184366692</sync_time>
  <add_update_list>
    <meta_data>
      <ASIN>B00ABC123</ASIN>
      <title pronunciation="a title">A Title</title>
      <authors>
        <author pronunciation="author one">Author One</author>
        <author pronunciation="author two">Author Two</author>
      </authors>
      <publishers><publisher>A Publisher</publisher></publishers>
      <publication_date>2014-01-01T00:00:00+0000</publication_date>
      <purchase_date>2021-02-01T10:00:00+0000</purchase_date>
      <cde_contenttype>EBOK</cde_contenttype>
      <content_type>application/x-mobipocket-ebook</content_type>
      <origins><origin><type>Purchase</type></origin></origins>
    </meta_data>
    <meta_data>
      <ASIN>PDOC0001</ASIN>
      <title>Personal Document</title>
      <authors/>
      <cde_contenttype>PDOC</cde_contenttype>
    </meta_data>
    <meta_data>
      <title>No identifier</title>
    </meta_data>
  </add_update_list>
</response>"#;

    #[test]
    fn test_parse_library_listing() {
        let library = Library::from_xml(BODY).unwrap();

        assert_eq!(
            library.sync_time.as_deref(),
            Some("2021-02-22T12:00:00+0000;softwareVersion:1184366692")
        );
        assert_eq!(library.books.len(), 2);

        let book = &library.books[0];
        assert_eq!(book.asin, "B00ABC123");
        assert_eq!(book.title.as_deref(), Some("A Title"));
        assert_eq!(book.authors, vec!["Author One", "Author Two"]);
        assert_eq!(book.publishers, vec!["A Publisher"]);
        assert_eq!(book.origin_type.as_deref(), Some("Purchase"));
        assert!(book.is_ebook());

        let doc = &library.books[1];
        assert!(doc.authors.is_empty());
        assert!(!doc.is_ebook());

        let ebooks: Vec<&str> = library.ebooks().map(|b| b.asin.as_str()).collect();
        assert_eq!(ebooks, vec!["B00ABC123"]);
    }

    #[test]
    fn test_empty_listing() {
        let library = Library::from_xml("<response><sync_time/></response>").unwrap();
        assert!(library.books.is_empty());
        assert_eq!(library.sync_time, None);
    }

    #[test]
    fn test_malformed_listing() {
        let err = Library::from_xml("<response><add_update_list>").unwrap_err();
        assert!(matches!(err, KindleError::LibraryParse(_)));
    }

    #[test]
    fn test_options_default_item_count() {
        let options: LibraryOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.item_count, 1000);
    }
}
