use anyhow::{Context, Result, bail};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Request/reply session to the mixer's runtime control endpoint.
///
/// The protocol is strictly alternating: one text command per request,
/// exactly one reply line before the next command may go out. Exclusive
/// ownership (`&mut self` on every send) enforces that; a second command
/// cannot be put in flight.
pub struct MixerControl {
    endpoint: SocketAddr,
    session: Option<BufStream<TcpStream>>,
    reply_timeout: Duration,
}

impl MixerControl {
    pub fn new(endpoint: SocketAddr) -> Self {
        MixerControl {
            endpoint,
            session: None,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub async fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect(self.endpoint)
            .await
            .with_context(|| format!("connecting to control endpoint {}", self.endpoint))?;
        stream.set_nodelay(true).ok();
        self.session = Some(BufStream::new(stream));
        log::info!("control channel connected to {}", self.endpoint);
        Ok(())
    }

    /// Connects, retrying while the engine is still binding its endpoint.
    pub async fn connect_with_retry(&mut self, attempts: u32, delay: Duration) -> Result<()> {
        for attempt in 1..=attempts {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    log::warn!("control endpoint not ready (attempt {attempt}/{attempts}): {e:#}");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        bail!("control endpoint {} unreachable", self.endpoint)
    }

    /// Sends `"<target> <param> <value>"` and consumes the single reply.
    ///
    /// The reply's content only completes the handshake; it is logged at
    /// debug level and otherwise discarded. Any transport failure tears
    /// down the session so the next send starts from a fresh connection.
    pub async fn set(&mut self, target: &str, param: &str, value: &str) -> Result<()> {
        if self.session.is_none() {
            self.connect().await?;
        }

        let command = format!("{target} {param} {value}\n");
        let reply_timeout = self.reply_timeout;
        let exchange = async {
            // Unwrap is fine: checked above, and nothing awaits in between.
            let session = self.session.as_mut().unwrap();
            session.write_all(command.as_bytes()).await?;
            session.flush().await?;

            let mut reply = String::new();
            let read = session.read_line(&mut reply).await?;
            if read == 0 {
                bail!("control endpoint closed the connection");
            }
            log::debug!("control reply: {}", reply.trim_end());
            Ok(())
        };

        match timeout(reply_timeout, exchange).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.session = None;
                Err(e)
            }
            Err(_) => {
                self.session = None;
                bail!("control command {:?} timed out", command.trim_end());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// One-connection fake control endpoint; forwards each received line
    /// and answers `0 Success` unless `mute_replies` is set.
    async fn fake_endpoint(mute_replies: bool) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = BufReader::new(stream);
            let mut line = String::new();
            loop {
                line.clear();
                if stream.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                tx.send(line.trim_end().to_string()).ok();
                if !mute_replies {
                    stream.get_mut().write_all(b"0 Success\n").await.ok();
                }
            }
        });

        (addr, rx)
    }

    #[tokio::test]
    async fn sends_one_command_line_and_consumes_one_reply() {
        let (addr, mut commands) = fake_endpoint(false).await;
        let mut control = MixerControl::new(addr);
        control.connect().await.unwrap();

        control.set("volume@music", "volume", "0.3").await.unwrap();
        assert_eq!(commands.recv().await.unwrap(), "volume@music volume 0.3");

        // The reply was consumed, so the channel is clean for the next
        // exchange.
        control.set("volume@music", "volume", "0").await.unwrap();
        assert_eq!(commands.recv().await.unwrap(), "volume@music volume 0");
    }

    #[tokio::test]
    async fn missing_reply_times_out_and_resets_the_session() {
        let (addr, mut commands) = fake_endpoint(true).await;
        let mut control =
            MixerControl::new(addr).with_reply_timeout(Duration::from_millis(100));
        control.connect().await.unwrap();

        let result = control.set("volume@music", "volume", "0.3").await;
        assert!(result.is_err());
        assert!(!control.is_connected());
        assert_eq!(commands.recv().await.unwrap(), "volume@music volume 0.3");
    }

    #[tokio::test]
    async fn connect_fails_cleanly_when_endpoint_is_absent() {
        // Bind-then-drop guarantees a dead port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut control = MixerControl::new(addr);
        assert!(control.connect().await.is_err());
        assert!(!control.is_connected());
    }
}
