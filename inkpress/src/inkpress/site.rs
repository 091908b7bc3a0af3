use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::inkpress::blog;
use crate::inkpress::cache::RenderCache;
use crate::inkpress::config::{SiteConfig, load_site_view};
use crate::inkpress::escape::escape_html;
use crate::inkpress::path_index::PathLookup;
use crate::inkpress::posts::{DateFormat, Post, list_posts, slug_of};
use crate::inkpress::template::TemplateEngine;
use crate::inkpress::view::{Value, View};

/// Everything a request needs: configuration, the site-wide view from
/// `app.json`, the render cache, path lookups and the template engine.
pub struct Site {
    config: SiteConfig,
    root: PathBuf,
    view: View,
    cache: RenderCache,
    paths: PathLookup,
    engine: TemplateEngine,
}

impl Site {
    pub fn open(config: SiteConfig) -> Result<Self> {
        let root = config.server.site_root_path();
        let view = load_site_view(&root)?;
        let mode = config.server.mode;

        let paths = if mode.is_draft() {
            PathLookup::live(&root)
        } else {
            PathLookup::indexed(&root)
        };

        info!("serving {} in {:?} mode", root.display(), mode);
        Ok(Self {
            engine: TemplateEngine::new(config.render.max_depth),
            cache: RenderCache::new(mode),
            config,
            root,
            view,
            paths,
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn paths(&self) -> &PathLookup {
        &self.paths
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    pub fn is_draft(&self) -> bool {
        self.cache.mode().is_draft()
    }

    /// Site owner, used as the default post author.
    pub fn name(&self) -> String {
        self.view.text("name").unwrap_or_default()
    }

    /// Read a file under the site root. Paths that climb out of it are refused.
    pub fn read_file(&self, relative: &str) -> Result<Vec<u8>> {
        let path = self.resolve(relative)?;
        fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }

    pub fn read_template(&self, relative: &str) -> Result<String> {
        let bytes = self.read_file(relative)?;
        String::from_utf8(bytes).with_context(|| format!("{relative} is not valid UTF-8"))
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            anyhow::bail!("refusing path outside the site root: {}", relative.display());
        }
        Ok(self.root.join(relative))
    }

    /// Render `template` against `view`, resolving `{{>name}}` from files in
    /// the site root. An unreadable partial renders as nothing.
    pub fn render(&self, template: &str, view: &View) -> String {
        let partials = |name: &str| match self.read_template(name) {
            Ok(text) => Some(text),
            Err(err) => {
                warn!("partial {name}: {err:#}");
                Some(String::new())
            }
        };
        self.engine.render(template, view, &partials)
    }

    /// Posts this site shows, newest first: all of them in draft mode,
    /// published ones otherwise.
    pub fn visible_posts(&self) -> impl Iterator<Item = Post> + '_ {
        list_posts(&self.root).into_iter().filter_map(move |file| {
            let slug = slug_of(&file);
            match Post::load(&self.root, slug) {
                Ok(post) if self.is_draft() || post.is_published() => Some(post),
                Ok(_) => None,
                Err(err) => {
                    warn!("skipping post {file}: {err:#}");
                    None
                }
            }
        })
    }

    /// Full page for one post, rendered through the site's `post.html`.
    pub fn render_post(&self, slug: &str) -> Result<String> {
        let post = Post::load(&self.root, slug)?;
        let template = self.read_template("post.html")?;

        let mut entry = post.to_view();
        if let Some(date) = post.date() {
            entry.insert("date", DateFormat::User.format(&date));
        }
        if !entry.contains("author") {
            entry.insert("author", self.name());
        }

        Ok(self.render(&template, &self.view.merge(&entry)))
    }

    /// Render an HTML file from the site root as a template. `base_url` is the
    /// scheme and host the request came in on.
    pub fn render_page(self: &Arc<Self>, file: &str, base_url: &str) -> Result<String> {
        let template = self.read_template(file)?;
        Ok(self.render(&template, &self.page_view(base_url)))
    }

    /// Site view plus the computed `feed`, `links`, `tabs` and `blog` values.
    /// Each is produced only if the page asks for it.
    pub fn page_view(self: &Arc<Self>, base_url: &str) -> View {
        let mut view = self.view.clone();

        if view.text("feed").is_none_or(|feed| feed.is_empty()) {
            let feed = format!("{base_url}/{}", blog::ATOM_PATH.trim_start_matches('/'));
            view.insert("feed", Value::lazy(move || feed.clone()));
        }

        let links = list_field(&self.view, "links");
        view.insert(
            "links",
            Value::lazy(move || {
                links
                    .iter()
                    .map(|link| {
                        format!(
                            "<a class='icon' target='_blank' href='{}' title='{}'><span class='symbol'>{}</span></a>",
                            link.text("url").unwrap_or_default(),
                            escape_html(&link.text("name").unwrap_or_default()),
                            link.text("symbol").unwrap_or_default(),
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
        );

        let pages = list_field(&self.view, "pages");
        view.insert(
            "tabs",
            Value::lazy(move || {
                pages
                    .iter()
                    .map(|page| {
                        format!(
                            "<li class='tab'><a href='{}'>{}</a></li>",
                            page.text("url").unwrap_or_default(),
                            escape_html(&page.text("name").unwrap_or_default()),
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }),
        );

        let site = Arc::clone(self);
        view.insert("blog", Value::lazy(move || blog::render_stream(&site, 0)));

        view
    }
}

fn list_field(view: &View, name: &str) -> Vec<View> {
    match view.get(name) {
        Some(Value::List(items)) => items.clone(),
        _ => Vec::new(),
    }
}
