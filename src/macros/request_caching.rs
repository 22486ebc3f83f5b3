/// check if a request is in the cache, if it is, return it.
/// else follow the normal flow
macro_rules! read_cache_request {
    ( $cache:expr, $key:expr ) => {
        if let Some(cached) = $cache.get(&$key) {
            match serde_json::from_str(&cached) {
                Ok(value) => return Ok(Json(value)),
                Err(error) => {
                    error!(target:"macros:read_cache_request", "Error decoding cached response: (key: {}, error: {})", $key, error);
                }
            }
        }
    }
}

/// add the response to the request to the cache and then return it.
macro_rules! cache_response {
    ( $cache:expr, $key:expr, $ttl:expr, $data:expr ) => {
        match serde_json::to_string(&$data) {
            Ok(raw) => $cache.set(&$key, raw, $ttl),
            Err(error) => {
                error!(target:"macros:cache_response", "Error encoding response for cache: (key: {}, error: {})", $key, error);
            }
        }

        return Ok(Json($data))
    }
}

pub(crate) use read_cache_request;
pub(crate) use cache_response;
