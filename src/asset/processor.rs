//! Content processors
//!
//! A processor streams the members of an asset into one output in bundle
//! order. Processors never buffer a whole member.

use super::Asset;
use crate::error::{ClientlibError, ClientlibResult};
use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

const COPY_BUF: usize = 8 * 1024;

/// Turns the members of an asset into one artifact
#[async_trait]
pub trait ContentProcessor: Send + Sync {
    /// Mime type of the produced content
    fn mime_type(&self) -> &'static str;

    /// Write the bundled content of `asset` into `out`
    async fn process(
        &self,
        asset: &Asset,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClientlibResult<()>;
}

/// Bundles JavaScript members
///
/// Each member ends with a newline, and a member whose last statement is not
/// terminated gets a `;` so the next member cannot continue its expression.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavascriptProcessor;

#[async_trait]
impl ContentProcessor for JavascriptProcessor {
    fn mime_type(&self) -> &'static str {
        "application/javascript"
    }

    async fn process(
        &self,
        asset: &Asset,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClientlibResult<()> {
        for member in asset.source().members() {
            let tail = copy_member(asset, member, out).await?;
            match tail.last_significant {
                // Empty or whitespace-only member
                None => {}
                Some(b';') | Some(b'}') => {
                    if tail.last_byte != Some(b'\n') {
                        write(out, b"\n").await?;
                    }
                }
                Some(_) => write(out, b";\n").await?,
            }
        }
        Ok(())
    }
}

/// Bundles stylesheet members, one newline between members
#[derive(Debug, Clone, Copy, Default)]
pub struct CssProcessor;

#[async_trait]
impl ContentProcessor for CssProcessor {
    fn mime_type(&self) -> &'static str {
        "text/css"
    }

    async fn process(
        &self,
        asset: &Asset,
        out: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> ClientlibResult<()> {
        for member in asset.source().members() {
            let tail = copy_member(asset, member, out).await?;
            if tail.last_byte.is_some_and(|b| b != b'\n') {
                write(out, b"\n").await?;
            }
        }
        Ok(())
    }
}

/// What the end of a copied member looked like
struct MemberTail {
    last_byte: Option<u8>,
    last_significant: Option<u8>,
}

async fn copy_member(
    asset: &Asset,
    member: &str,
    out: &mut (dyn AsyncWrite + Send + Unpin),
) -> ClientlibResult<MemberTail> {
    let mut reader = asset.source().open(member).await?;
    let mut buf = vec![0u8; COPY_BUF];
    let mut tail = MemberTail {
        last_byte: None,
        last_significant: None,
    };
    let mut copied = 0usize;

    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| ClientlibError::io(format!("reading {}", member), e))?;
        if n == 0 {
            break;
        }
        let chunk = &buf[..n];
        tail.last_byte = chunk.last().copied();
        if let Some(b) = chunk.iter().rev().find(|b| !b.is_ascii_whitespace()) {
            tail.last_significant = Some(*b);
        }
        write(out, chunk).await?;
        copied += n;
    }

    trace!("Bundled {} ({} bytes) into {}", member, copied, asset.path);
    Ok(tail)
}

async fn write(out: &mut (dyn AsyncWrite + Send + Unpin), bytes: &[u8]) -> ClientlibResult<()> {
    out.write_all(bytes)
        .await
        .map_err(|e| ClientlibError::io("writing bundled content", e))
}
