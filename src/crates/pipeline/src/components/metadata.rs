//! Site metadata extraction component
//!
//! Pulls title, description, author, language, and site name out of the
//! raw HTML with regexes and stores site context for the storage layer.

use crate::component::{ComponentType, PipelineComponent, SharedPage};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

pub struct SiteMetadataComponent {
    title: Regex,
    meta_named: Regex,
    og_site_name: Regex,
    html_lang: Regex,
}

impl SiteMetadataComponent {
    pub fn new() -> Self {
        Self {
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static pattern"),
            // matches <meta name="..." content="..."> in either attribute order
            meta_named: Regex::new(
                r#"(?is)<meta\s+[^>]*name=["'](?P<name>[^"']+)["'][^>]*content=["'](?P<content>[^"']*)["']"#,
            )
            .expect("static pattern"),
            og_site_name: Regex::new(
                r#"(?is)<meta\s+[^>]*property=["']og:site_name["'][^>]*content=["'](?P<content>[^"']*)["']"#,
            )
            .expect("static pattern"),
            html_lang: Regex::new(r#"(?is)<html[^>]*\blang=["']?(?P<lang>[a-zA-Z-]+)"#)
                .expect("static pattern"),
        }
    }

    fn meta_content(&self, html: &str, name: &str) -> Option<String> {
        self.meta_named.captures_iter(html).find_map(|captures| {
            let found = captures.name("name")?.as_str();
            if found.eq_ignore_ascii_case(name) {
                Some(captures.name("content")?.as_str().trim().to_string())
            } else {
                None
            }
        })
    }
}

impl Default for SiteMetadataComponent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineComponent for SiteMetadataComponent {
    fn kind(&self) -> ComponentType {
        ComponentType::Metadata
    }

    fn name(&self) -> &'static str {
        "SiteMetadataComponent"
    }

    async fn validate(&self, page: &SharedPage) -> Result<bool> {
        let page = page.lock().await;
        if page.url.is_empty() || page.domain.is_empty() {
            return Err(PipelineError::Validation(
                "metadata validation failed: page has no url or domain".into(),
            ));
        }
        Ok(true)
    }

    async fn process(&self, page: &SharedPage) -> Result<()> {
        let (content, url, domain) = {
            let page = page.lock().await;
            (
                page.content.clone().unwrap_or_default(),
                page.url.clone(),
                page.domain.clone(),
            )
        };

        let title = self
            .title
            .captures(&content)
            .map(|c| c[1].trim().to_string())
            .filter(|t| !t.is_empty());
        let description = self.meta_content(&content, "description");
        let author = self.meta_content(&content, "author");
        let site_name = self
            .og_site_name
            .captures(&content)
            .map(|c| c["content"].trim().to_string());
        let language = self
            .html_lang
            .captures(&content)
            .map(|c| c["lang"].to_lowercase());

        let scheme = url.split("://").next().unwrap_or("https");
        let site_url = format!("{scheme}://{domain}");

        // completeness of the extracted fields feeds the quality score
        let found = [&title, &description, &author, &site_name, &language]
            .iter()
            .filter(|f| f.is_some())
            .count();
        let quality = found as f64 / 5.0;

        let mut page = page.lock().await;
        if page.title.is_none() {
            page.title = title;
        }
        if page.metadata.language.is_none() {
            page.metadata.language = language;
        }
        if page.metadata.author.is_none() {
            page.metadata.author = author;
        }
        page.metadata.metadata_quality_score = quality;
        page.metadata.custom.insert("site_url".into(), json!(site_url));
        if let Some(name) = site_name {
            page.metadata.custom.insert("site_name".into(), json!(name));
        }
        if let Some(description) = description {
            page.metadata
                .custom
                .insert("site_description".into(), json!(description));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::shared_page;
    use weaver_domain::Page;

    fn page_with(content: &str) -> SharedPage {
        let mut page = Page::new("https://example.com/a", "example.com").unwrap();
        page.content = Some(content.to_string());
        shared_page(page)
    }

    #[tokio::test]
    async fn test_extracts_title_and_language() {
        let component = SiteMetadataComponent::new();
        let page = page_with(
            r#"<html lang="en"><head><title> Example Page </title>
               <meta name="description" content="A page about graphs">
               <meta name="author" content="Ada">
               <meta property="og:site_name" content="Example"></head></html>"#,
        );

        component.process(&page).await.unwrap();
        let page = page.lock().await;
        assert_eq!(page.title.as_deref(), Some("Example Page"));
        assert_eq!(page.metadata.language.as_deref(), Some("en"));
        assert_eq!(page.metadata.author.as_deref(), Some("Ada"));
        assert_eq!(
            page.metadata.custom.get("site_url").unwrap(),
            "https://example.com"
        );
        assert_eq!(page.metadata.custom.get("site_name").unwrap(), "Example");
        assert!((page.metadata.metadata_quality_score - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_missing_metadata_leaves_defaults() {
        let component = SiteMetadataComponent::new();
        let page = page_with("plain text, no markup");

        component.process(&page).await.unwrap();
        let page = page.lock().await;
        assert!(page.title.is_none());
        assert!(page.metadata.language.is_none());
        assert_eq!(page.metadata.metadata_quality_score, 0.0);
    }

    #[tokio::test]
    async fn test_validate_requires_url_and_domain() {
        let component = SiteMetadataComponent::new();
        assert!(component.validate(&page_with("x")).await.unwrap());
    }
}
