/// The dynamic rule replacement.
pub mod ds_file;
pub use ds_file::*;

use super::*;

pub trait DataSource<P: SentinelRule + PartialEq + DeserializeOwned, H: PropertyHandler<P>>:
    Send
{
    fn get_base(&mut self) -> &mut DataSourceBase<P, H>;
    /// Add specified property handler in current datasource
    fn add_property_handler(&mut self, h: Arc<H>) {
        self.get_base().add_property_handler(h);
    }
    /// Remove specified property handler in current datasource
    fn remove_property_handler(&mut self, h: Arc<H>) {
        self.get_base().remove_property_handler(h);
    }
}

pub struct DataSourceBase<P: SentinelRule + PartialEq + DeserializeOwned, H: PropertyHandler<P>> {
    handlers: Vec<Arc<H>>,
    phantom: PhantomData<P>,
}

impl<P, H> Default for DataSourceBase<P, H>
where
    P: SentinelRule + PartialEq + DeserializeOwned,
    H: PropertyHandler<P>,
{
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            phantom: PhantomData,
        }
    }
}

impl<P, H> DataSourceBase<P, H>
where
    P: SentinelRule + PartialEq + DeserializeOwned,
    H: PropertyHandler<P>,
{
    /// passes `src` to every handler, the errors of all the handlers are collected
    pub fn update(&self, src: Option<&str>) -> Result<()> {
        let mut err = String::new();
        for h in &self.handlers {
            if let Err(e) = h.handle(src) {
                err.push_str(&format!("{:?}", e));
            }
        }
        if err.is_empty() {
            Ok(())
        } else {
            Err(Error::msg(err))
        }
    }

    // return idx if existed, else return None
    pub fn index_of_handler(&self, h: &Arc<H>) -> Option<usize> {
        self.handlers
            .iter()
            .position(|handler| Arc::ptr_eq(handler, h))
    }

    pub fn add_property_handler(&mut self, h: Arc<H>) {
        if self.index_of_handler(&h).is_some() {
            return;
        }
        self.handlers.push(h);
    }

    pub fn remove_property_handler(&mut self, h: Arc<H>) {
        if let Some(idx) = self.index_of_handler(&h) {
            self.handlers.swap_remove(idx);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn load(&self, rules: Vec<Arc<P>>) -> Result<bool> {
        let mut res = true;
        for h in &self.handlers {
            res = h.load(rules.clone())? && res;
        }
        Ok(res)
    }
}
