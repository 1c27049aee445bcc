//! Server-sent events -> [`FragmentStream`].

use super::{Fragment, FragmentStream, ProviderError};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Response;

/// Fail early with the upstream body when the status is not 2xx.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status, &body))
}

/// `handler` gets every event's data payload and returns zero or more
/// fragments. Transport errors end up as stream items.
pub fn fragment_stream_from_sse<H>(response: Response, mut handler: H) -> FragmentStream
where
    H: FnMut(&str) -> Result<Vec<Fragment>, ProviderError> + Send + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| match event {
            Ok(event) => handler(event.data.as_str()),
            Err(err) => Err(ProviderError::transient(format!("stream read failed: {err}"))),
        })
        .flat_map(|result| {
            let items: Vec<Result<Fragment, ProviderError>> = match result {
                Ok(fragments) => fragments.into_iter().map(Ok).collect(),
                Err(err) => vec![Err(err)],
            };
            futures_util::stream::iter(items)
        });

    Box::pin(stream)
}
