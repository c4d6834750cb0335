//! Async RouterOS API client.
//!
//! One command is in flight at a time, so replies need no `.tag`
//! routing: the client writes a sentence, then reads `!re` rows until
//! the matching `!done`.

use crate::api::codec;
use crate::api::sentence::{Command, Reply, Sentence, REPLY_DONE, REPLY_FATAL, REPLY_RE, REPLY_TRAP};
use crate::api::types::{ApiConfig, ApiError, ApiErrorKind};
use md5::{Digest, Md5};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub struct ApiClient<S = TcpStream> {
    stream: S,
    config: ApiConfig,
    /// Set after `!fatal` or a timed-out exchange; the stream may no
    /// longer sit on a sentence boundary.
    dead: bool,
}

impl ApiClient<TcpStream> {
    /// Dial the router and log in.
    pub async fn connect(config: &ApiConfig) -> Result<Self, ApiError> {
        let address = config.address();
        log::info!("[{address}] connecting to API");
        let dial = TcpStream::connect(&address);
        let stream = match timeout(Duration::from_secs(config.timeout_secs), dial).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ApiError::new(
                    ApiErrorKind::ConnectionFailed,
                    format!("API connect to {address} failed: {e}"),
                ))
            }
            Err(_) => {
                return Err(ApiError::new(
                    ApiErrorKind::Timeout,
                    format!("API connect to {address} timed out after {}s", config.timeout_secs),
                ))
            }
        };
        let mut client = Self::over_stream(stream, config.clone());
        client.login().await?;
        Ok(client)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> ApiClient<S> {
    /// Wrap an already-established transport (an SSH tunnel, an
    /// in-memory pipe in tests). No login is performed.
    pub fn over_stream(stream: S, config: ApiConfig) -> Self {
        Self { stream, config, dead: false }
    }

    pub fn address(&self) -> String {
        self.config.address()
    }

    /// RouterOS login. Routers since 6.43 accept the plain form; older
    /// ones answer `=ret=<hex>` and expect the md5 challenge response.
    pub async fn login(&mut self) -> Result<(), ApiError> {
        let name = self.config.username.clone();
        let password = self.config.password.clone();
        let reply = self
            .run(
                Command::new("/login")
                    .attribute("name", &name)
                    .attribute("password", &password),
            )
            .await
            .map_err(as_auth_failure)?;

        if let Some(challenge) = reply.done_attr("ret") {
            log::debug!("[{}] router requested legacy md5 login", self.config.address());
            let response = challenge_response(&password, challenge)?;
            self.run(
                Command::new("/login")
                    .attribute("name", &name)
                    .attribute("response", &response),
            )
            .await
            .map_err(as_auth_failure)?;
        }
        log::info!("[{}] API login ok as \"{}\"", self.config.address(), name);
        Ok(())
    }

    /// Execute one command and collect its reply. The whole exchange is
    /// bounded by the configured timeout.
    pub async fn run(&mut self, command: Command) -> Result<Reply, ApiError> {
        if self.dead {
            return Err(ApiError::not_connected());
        }
        let window = Duration::from_secs(self.config.timeout_secs);
        match timeout(window, self.exchange(command)).await {
            Ok(result) => result,
            Err(_) => {
                self.dead = true;
                Err(ApiError::new(
                    ApiErrorKind::Timeout,
                    format!("command timed out after {}s", self.config.timeout_secs),
                ))
            }
        }
    }

    /// Close the transport. API sessions have no farewell sentence; the
    /// router drops state when the TCP stream goes away.
    pub async fn close(mut self) -> Result<(), ApiError> {
        self.stream.shutdown().await?;
        Ok(())
    }

    async fn exchange(&mut self, command: Command) -> Result<Reply, ApiError> {
        let path = command.path().to_string();
        log::debug!("[{}] >>> {}", self.config.address(), path);
        let buf = codec::encode_sentence(&command.into_words());
        self.stream.write_all(&buf).await?;
        self.stream.flush().await?;

        let mut rows = Vec::new();
        let mut trap: Option<String> = None;
        loop {
            let sentence = self.read_sentence().await?;
            match sentence.category() {
                Some(REPLY_RE) => rows.push(sentence.attributes()),
                Some(REPLY_DONE) => {
                    let done = sentence.attributes();
                    log::debug!(
                        "[{}] <<< {} row(s) for {}",
                        self.config.address(),
                        rows.len(),
                        path
                    );
                    return match trap {
                        Some(message) => Err(ApiError::trap(message)),
                        None => Ok(Reply { rows, done }),
                    };
                }
                Some(REPLY_TRAP) => {
                    let row = sentence.attributes();
                    let message = match row.opt("message") {
                        Some(m) => m.to_string(),
                        None => sentence.words[1..].join(" "),
                    };
                    trap = Some(format!("{path}: {message}"));
                }
                Some(REPLY_FATAL) => {
                    self.dead = true;
                    let detail = sentence.words[1..].join(" ");
                    return Err(ApiError::new(
                        ApiErrorKind::Fatal,
                        format!("{path}: {detail}"),
                    ));
                }
                // Unknown or empty sentences are skipped, not fatal.
                _ => {}
            }
        }
    }

    async fn read_sentence(&mut self) -> Result<Sentence, ApiError> {
        let mut words = Vec::new();
        while let Some(word) = codec::read_word(&mut self.stream).await? {
            words.push(word);
        }
        Ok(Sentence { words })
    }
}

fn as_auth_failure(e: ApiError) -> ApiError {
    match e.kind {
        ApiErrorKind::Trap => ApiError::new(ApiErrorKind::AuthenticationFailed, e.message),
        _ => e,
    }
}

/// `"00"` + md5(0x00 ‖ password ‖ challenge), hex-encoded.
fn challenge_response(password: &str, challenge_hex: &str) -> Result<String, ApiError> {
    let challenge = hex::decode(challenge_hex)
        .map_err(|e| ApiError::protocol(format!("bad login challenge: {e}")))?;
    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);
    Ok(format!("00{}", hex::encode(hasher.finalize())))
}
