//! File transfer streams
//!
//! A file transfer is a chat stream with a fixed direction and a
//! `file-selector` describing the file. The sender pushes the whole file as
//! soon as the connection is up; the receiver learns what it is getting from
//! the offer.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::MsrpClientConfig;
use crate::error::{MsrpError, MsrpResult};
use crate::events::EventEmitter;
use crate::file_selector::{FileSelector, SHA1_LEN};
use crate::sdp::{MediaDescription, StreamDirection, ATTR_FILE_SELECTOR};
use crate::stream::{CallContext, ChatStream, MediaStream};
use crate::transport::{MsrpTransport, OutgoingFile, HEADER_FAILURE_REPORT, HEADER_SUCCESS_REPORT};

/// Sends one file over a `sendonly` stream
pub struct OutgoingFileStream {
    chat: ChatStream,
    file: OutgoingFile,
    message_id: Mutex<Option<String>>,
}

impl OutgoingFileStream {
    /// `filename` may be a path; only its last component is advertised
    pub fn new(
        config: MsrpClientConfig,
        transport: Arc<dyn MsrpTransport>,
        filename: &str,
        data: Bytes,
        content_type: &str,
        sha1: Option<[u8; SHA1_LEN]>,
    ) -> Self {
        let name = Path::new(filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        let selector = FileSelector::new(name, content_type, data.len() as u64, sha1);

        let chat = ChatStream::with_direction(config, StreamDirection::SendOnly, transport);
        chat.set_file_selector(Some(selector));
        let file = OutgoingFile::new(data, content_type)
            .with_header(HEADER_SUCCESS_REPORT, "yes")
            .with_header(HEADER_FAILURE_REPORT, "partial");
        Self {
            chat,
            file,
            message_id: Mutex::new(None),
        }
    }

    pub fn file_selector(&self) -> Option<FileSelector> {
        self.chat.file_selector()
    }

    pub fn chat(&self) -> &ChatStream {
        &self.chat
    }

    /// Id of the transfer once it was handed to the transport; delivery
    /// events for the file carry it
    pub fn message_id(&self) -> Option<String> {
        self.message_id.lock().clone()
    }
}

#[async_trait]
impl MediaStream for OutgoingFileStream {
    fn events(&self) -> &EventEmitter {
        self.chat.events()
    }

    async fn initialize(&self, call: &CallContext) -> MsrpResult<MediaDescription> {
        self.chat.initialize(call).await
    }

    fn local_media(&self) -> Option<MediaDescription> {
        self.chat.local_media()
    }

    fn validate_incoming(&self, remote: &MediaDescription) -> MsrpResult<bool> {
        self.chat.validate_incoming(remote)
    }

    async fn start(&self, remote: &MediaDescription) -> MsrpResult<()> {
        self.chat.start(remote).await?;
        info!(size = self.file.size, content_type = %self.file.content_type, "Starting file transfer");
        let message_id = self
            .chat
            .send_file(self.file.clone())
            .map_err(|e| self.chat.fail_start(e))?;
        *self.message_id.lock() = Some(message_id);
        Ok(())
    }

    async fn end(&self) -> MsrpResult<()> {
        self.chat.end().await
    }
}

/// Receives one file over a `recvonly` stream
pub struct IncomingFileStream {
    chat: ChatStream,
}

impl IncomingFileStream {
    pub fn new(config: MsrpClientConfig, transport: Arc<dyn MsrpTransport>) -> Self {
        Self {
            chat: ChatStream::with_direction(config, StreamDirection::RecvOnly, transport),
        }
    }

    /// Selector taken from the accepted offer
    pub fn file_selector(&self) -> Option<FileSelector> {
        self.chat.file_selector()
    }

    pub fn chat(&self) -> &ChatStream {
        &self.chat
    }
}

#[async_trait]
impl MediaStream for IncomingFileStream {
    fn events(&self) -> &EventEmitter {
        self.chat.events()
    }

    async fn initialize(&self, call: &CallContext) -> MsrpResult<MediaDescription> {
        self.chat.initialize(call).await
    }

    fn local_media(&self) -> Option<MediaDescription> {
        self.chat.local_media()
    }

    /// Accepts a `sendonly` offer carrying a well-formed `file-selector`
    fn validate_incoming(&self, remote: &MediaDescription) -> MsrpResult<bool> {
        if !self.chat.validate_incoming(remote)? {
            return Ok(false);
        }
        let value = remote
            .attribute(ATTR_FILE_SELECTOR)
            .ok_or_else(|| MsrpError::file_selector("offer has no file-selector attribute"))?;
        let selector = FileSelector::parse(value)?;
        debug!(selector = %selector, "Accepting incoming file");
        self.chat.set_file_selector(Some(selector));
        Ok(true)
    }

    async fn start(&self, remote: &MediaDescription) -> MsrpResult<()> {
        self.chat.start(remote).await
    }

    async fn end(&self) -> MsrpResult<()> {
        self.chat.end().await
    }
}
