use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use log::debug;

use crate::inkpress::view::View;

pub const POSTS_DIR: &str = "blog";

/// The blog's own landing page, served as a regular page rather than a post.
const LANDING_PAGE: &str = "index.html";

/// A blog entry: front-matter fields plus the HTML body under `content`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    slug: String,
    fields: BTreeMap<String, String>,
}

impl Post {
    /// Read `blog/<slug>.html` under `site_root`.
    pub fn load(site_root: &Path, slug: &str) -> Result<Post> {
        let file = format!("{slug}.html");
        if file == LANDING_PAGE {
            anyhow::bail!("{POSTS_DIR}/{LANDING_PAGE} is a page, not a post");
        }
        let path = site_root.join(POSTS_DIR).join(file);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading post {}", path.display()))?;
        Ok(Post::parse(slug, &raw))
    }

    /// Split a post file into front matter and body. Lines between a pair of
    /// `---` markers are `key: value` fields; every other line is content.
    pub fn parse(slug: &str, raw: &str) -> Post {
        let mut fields = BTreeMap::new();
        let mut content = Vec::new();
        let mut lines = raw.lines();

        while let Some(line) = lines.next() {
            if !line.starts_with("---") {
                content.push(line);
                continue;
            }
            for line in lines.by_ref() {
                if line.starts_with("---") {
                    break;
                }
                if let Some((key, value)) = line.split_once(':') {
                    fields.insert(unquote(key).to_string(), unquote(value).to_string());
                }
            }
        }

        fields.insert("content".to_string(), content.join("\n"));
        Post {
            slug: slug.to_string(),
            fields,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Site-relative address of the post page.
    pub fn url_path(&self) -> String {
        format!("/{POSTS_DIR}/{}", self.slug)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn title(&self) -> &str {
        self.get("title").unwrap_or_default()
    }

    pub fn content(&self) -> &str {
        self.get("content").unwrap_or_default()
    }

    pub fn is_published(&self) -> bool {
        self.get("state") == Some("post")
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.get("date").and_then(parse_date)
    }

    /// `updated` when present and parseable, else the publish date.
    pub fn updated(&self) -> Option<DateTime<Utc>> {
        self.get("updated").and_then(parse_date).or_else(|| self.date())
    }

    pub fn to_view(&self) -> View {
        self.fields
            .iter()
            .map(|(key, value)| (key.clone(), value.as_str().into()))
            .collect()
    }
}

fn unquote(text: &str) -> &str {
    text.trim().trim_matches('"')
}

/// Post file names in the blog directory, newest first, without the landing
/// page. File names carry a date prefix, so reverse lexical order is reverse
/// chronological order.
pub fn list_posts(site_root: &Path) -> Vec<String> {
    let dir = site_root.join(POSTS_DIR);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("no posts under {}: {err}", dir.display());
            return Vec::new();
        }
    };

    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".html") && name != LANDING_PAGE)
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));
    names
}

/// File name to slug: `2024-01-01-hello.html` -> `2024-01-01-hello`.
pub fn slug_of(file_name: &str) -> &str {
    file_name.strip_suffix(".html").unwrap_or(file_name)
}

pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let with_offset = ["%Y-%m-%d %H:%M:%S %:z", "%Y-%m-%d %H:%M:%S %z"]
        .iter()
        .find_map(|fmt| DateTime::<FixedOffset>::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok());
    if let Some(date) = with_offset {
        return Some(date.with_timezone(&Utc));
    }

    let naive = raw
        .strip_suffix(" UTC")
        .or_else(|| raw.strip_suffix(" GMT"))
        .unwrap_or(raw);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|date| date.and_utc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `Jan 2, 2006`
    User,
    /// `2006-01-02T15:04:05Z`
    Atom,
}

impl DateFormat {
    pub fn format(self, date: &DateTime<Utc>) -> String {
        match self {
            DateFormat::User => date.format("%b %-d, %Y").to_string(),
            DateFormat::Atom => date.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    const SAMPLE: &str = "---\ntitle: \"Hello, World\"\ndate: 2024-03-05 09:30:00 -08:00\nstate: post\nauthor: Ann\n---\n<p>First paragraph.</p>\n<p>Second: with colon.</p>";

    #[test]
    fn parses_front_matter_and_content() {
        let post = Post::parse("2024-03-05-hello", SAMPLE);

        assert_eq!(post.title(), "Hello, World");
        assert_eq!(post.get("author"), Some("Ann"));
        assert!(post.is_published());
        assert_eq!(
            post.content(),
            "<p>First paragraph.</p>\n<p>Second: with colon.</p>"
        );
        assert_eq!(post.url_path(), "/blog/2024-03-05-hello");
    }

    #[test]
    fn drafts_are_not_published() {
        let post = Post::parse("x", "---\ntitle: WIP\nstate: draft\n---\nbody");
        assert!(!post.is_published());
        let bare = Post::parse("y", "just a body");
        assert!(!bare.is_published());
        assert_eq!(bare.content(), "just a body");
    }

    #[test]
    fn view_has_every_field_as_text() {
        let view = Post::parse("x", SAMPLE).to_view();
        assert_eq!(view.text("title").as_deref(), Some("Hello, World"));
        assert_eq!(view.text("state").as_deref(), Some("post"));
        assert!(view.text("content").unwrap().starts_with("<p>First"));
    }

    #[test]
    fn date_accepts_common_offset_spellings() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 17, 30, 0).unwrap();
        assert_eq!(parse_date("2024-03-05 09:30:00 -08:00"), Some(expected));
        assert_eq!(parse_date("2024-03-05 09:30:00 -0800"), Some(expected));
        assert_eq!(parse_date("2024-03-05T09:30:00-08:00"), Some(expected));
        assert_eq!(
            parse_date("2024-03-05 17:30:00 UTC"),
            Some(expected)
        );
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn updated_falls_back_to_date() {
        let post = Post::parse("x", SAMPLE);
        assert_eq!(post.updated(), post.date());

        let edited = Post::parse(
            "x",
            "---\ndate: 2024-03-05 09:30:00 +00:00\nupdated: 2024-04-01 00:00:00 +00:00\n---\n",
        );
        assert_eq!(
            edited.updated(),
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn formats_dates() {
        let date = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        assert_eq!(DateFormat::User.format(&date), "Jan 2, 2006");
        assert_eq!(DateFormat::Atom.format(&date), "2006-01-02T15:04:05Z");
    }

    #[test]
    fn lists_html_posts_newest_first() {
        let tmp = TempDir::new().unwrap();
        let blog = tmp.path().join(POSTS_DIR);
        fs::create_dir_all(blog.join("2025-01-01-folder.html")).unwrap();
        for name in [
            "2023-05-01-a.html",
            "2024-02-01-b.html",
            "notes.txt",
            "index.html",
            "2024-01-01-c.html",
        ] {
            fs::write(blog.join(name), "x").unwrap();
        }

        assert_eq!(
            list_posts(tmp.path()),
            vec!["2024-02-01-b.html", "2024-01-01-c.html", "2023-05-01-a.html"]
        );
        assert_eq!(slug_of("2024-02-01-b.html"), "2024-02-01-b");
    }

    #[test]
    fn missing_blog_dir_lists_nothing() {
        let tmp = TempDir::new().unwrap();
        assert!(list_posts(tmp.path()).is_empty());
    }

    #[test]
    fn load_reads_from_blog_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(POSTS_DIR)).unwrap();
        fs::write(tmp.path().join("blog/2024-03-05-hello.html"), SAMPLE).unwrap();

        let post = Post::load(tmp.path(), "2024-03-05-hello").unwrap();
        assert_eq!(post.slug(), "2024-03-05-hello");
        assert!(Post::load(tmp.path(), "missing").is_err());

        fs::write(tmp.path().join("blog/index.html"), "<h1>Blog</h1>").unwrap();
        assert!(Post::load(tmp.path(), "index").is_err());
    }
}
