use super::sort::{Key, collect_keys, key_of};
use super::{Source, Stream};
use crate::error::Result;
use crate::value::Value;

impl Stream {
    /// Keep the first item of every run of equal keys (the whole item when `keys` is empty).
    ///
    /// With `sort` the stream is sorted by the key first, which makes the output distinct;
    /// without it only adjacent duplicates are removed.
    ///
    /// # Errors
    /// Sort errors when `sort` is set; key errors surface while the output is consumed.
    pub fn uniq<I>(self, keys: I, sort: bool) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Key>,
    {
        let keys = collect_keys(keys);
        let extract = key_of(&keys, self.meta.schema.as_ref(), "uniq");
        let stream = if sort {
            self.sort_with(std::sync::Arc::clone(&extract), false)?
        } else {
            self
        };
        let (iter, meta) = stream.into_parts();
        let mut last: Option<Vec<Value>> = None;
        let out = iter.filter_map(move |r| {
            let item = match r {
                Ok(item) => item,
                Err(e) => return Some(Err(e)),
            };
            let key = match extract(&item) {
                Ok(k) => k,
                Err(e) => return Some(Err(e)),
            };
            if last.as_ref() == Some(&key) {
                return None;
            }
            last = Some(key);
            Some(Ok(item))
        });
        Ok(Self::from_parts(Source::Lazy(Box::new(out)), meta.reshaped()))
    }
}
