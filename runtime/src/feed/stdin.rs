//! Line-delimited feed read from stdin, one JSON message per line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use super::dispatcher::FeedDispatcher;

pub struct StdinFeed<R> {
    reader: R,
    dispatcher: FeedDispatcher,
}

impl StdinFeed<BufReader<tokio::io::Stdin>> {
    pub fn new(dispatcher: FeedDispatcher) -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()), dispatcher)
    }
}

impl<R: AsyncBufRead + Unpin> StdinFeed<R> {
    pub fn from_reader(reader: R, dispatcher: FeedDispatcher) -> Self {
        Self { reader, dispatcher }
    }

    /// Dispatch lines until EOF or until the product channel closes.
    /// Returns the number of non-empty lines handled.
    pub async fn run(mut self) -> usize {
        let mut line = String::new();
        let mut handled = 0;

        loop {
            line.clear();
            match self.reader.read_line(&mut line).await {
                Ok(0) => {
                    tracing::info!("EOF on feed input, stopping");
                    break;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    handled += 1;
                    if self.dispatcher.dispatch(trimmed).await.is_err() {
                        tracing::info!("Live product channel closed, stopping feed input");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Feed input read error: {e}");
                    break;
                }
            }
        }
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::feed_channel;

    #[tokio::test]
    async fn test_reads_lines_until_eof() {
        let input = concat!(
            r#"{"type":"pinConfig","body":{"https://kith.com":{}}}"#,
            "\n\n   \n",
            r#"{"type":"livemonitor","body":{"type":"shopify","payload":{"store":"https://kith.com","product":{"id":1,"title":"Dunk"}}}}"#,
            "\nnot json\n",
        );
        let (tx, mut rx) = feed_channel();
        let dispatcher = FeedDispatcher::new(tx);
        let state = dispatcher.state();
        let feed = StdinFeed::from_reader(BufReader::new(input.as_bytes()), dispatcher);

        let handle = tokio::spawn(feed.run());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.product.title, "Dunk");
        assert_eq!(handle.await.unwrap(), 3);
        assert_eq!(state.read().await.sites.len(), 1);
    }

    #[tokio::test]
    async fn test_stops_when_channel_closed() {
        let input = concat!(
            r#"{"type":"livemonitor","body":{"type":"shopify","payload":{"store":"a","product":{}}}}"#,
            "\n",
            r#"{"type":"pong"}"#,
            "\n",
        );
        let (tx, rx) = feed_channel();
        drop(rx);
        let reader = BufReader::new(input.as_bytes());
        let feed = StdinFeed::from_reader(reader, FeedDispatcher::new(tx));
        assert_eq!(feed.run().await, 1);
    }
}
