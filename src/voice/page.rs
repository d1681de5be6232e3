use anyhow::Result;
use async_trait::async_trait;

/// One live browser page, owned by a single synthesis session.
#[async_trait]
pub trait PageDriver: Send {
    /// Load `url` and wait for the navigation to finish.
    async fn goto(&mut self, url: &str) -> Result<()>;

    /// Replace the value of the input matched by `selector`.
    async fn fill(&mut self, selector: &str, text: &str) -> Result<()>;

    async fn click(&mut self, selector: &str) -> Result<()>;

    /// Whether `selector` currently matches an element.
    async fn exists(&mut self, selector: &str) -> Result<bool>;

    async fn attribute(&mut self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Release the page together with the browser behind it.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Produces a fresh, isolated page for every synthesis.
#[async_trait]
pub trait PageLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>>;
}
