use chromiumoxide_cdp::cdp::browser_protocol::browser::BrowserContextId;

/// Identity of an incognito-style browser context targets can live in
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct BrowserContext {
    pub(crate) id: Option<BrowserContextId>,
}

impl BrowserContext {
    pub fn id(&self) -> Option<&BrowserContextId> {
        self.id.as_ref()
    }
}

impl From<BrowserContextId> for BrowserContext {
    fn from(id: BrowserContextId) -> Self {
        Self { id: Some(id) }
    }
}
