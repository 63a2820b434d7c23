/// Read-through caching over an optional [`Cache`](crate::db::Cache).
///
/// With no cache configured the block simply runs. With one, a hit is returned
/// directly and a miss runs the block and queues the result for a background
/// write. A failing cache read is logged and treated as a miss.
///
/// # Arguments
/// * `$cache`: an `Option<Cache>`
/// * `$key`: the `CacheKey` for the value
/// * `$ttl`: time-to-live in seconds
/// * `$block`: a future yielding `AppResult<T>`
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.as_ref() {
            None => $block.await,
            Some(cache) => {
                let hit = match cache.get_from_cache(&$key).await {
                    Ok(hit) => hit,
                    Err(e) => {
                        tracing::warn!(error = %e, key = %$key, "Cache read failed, bypassing cache");
                        None
                    }
                };
                match hit {
                    Some(cached) => Ok(cached),
                    None => {
                        let value = $block.await?;
                        cache.set_in_background(&$key, &value, $ttl);
                        Ok(value)
                    }
                }
            }
        }
    }};
}
