// REMOTE HARNESS AND EVALUATOR SERVER
// THE TUNER SHIPS EACH CONFIGURATION TO A PEER THAT OWNS THE MACHINE UNDER
// TEST. THE PEER RUNS ITS OWN LOCAL HARNESS AND SENDS BACK THE BATCH.
//
// WIRE: EVERY MESSAGE IS ONE FRAME = u32 BIG-ENDIAN LENGTH + JSON BODY.
//
//   CLIENT                          SERVER
//   Hello { sut, ... }     ---->
//                          <----    Ready | Failed
//   Evaluate { cfg, n }    ---->
//                          <----    Batch { samples, temperatures } | Failed
//   ...
//   Finished               ---->    (SESSION ENDS)

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;
use crate::error::HarnessError;

use super::{Harness, SampleBatch};

pub const MAX_FRAME: usize = 16 * 1024 * 1024;
const ACCEPT_POLL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hello {
    pub sut: String,
    pub max_temperature: f64,
    #[serde(default)]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub drop_caches: bool,
    #[serde(default)]
    pub governor: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Hello(Hello),
    Evaluate {
        configuration: EnemyConfiguration,
        iterations: usize,
    },
    Finished,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ready,
    Batch(SampleBatch),
    Failed { reason: String },
}

// ---------------------------------------------------------------------------
// FRAMING
// ---------------------------------------------------------------------------

pub fn write_frame<W: Write, T: Serialize>(w: &mut W, msg: &T) -> Result<(), HarnessError> {
    let body = serde_json::to_vec(msg)
        .map_err(|e| HarnessError::Protocol(format!("encode: {}", e)))?;
    if body.len() > MAX_FRAME {
        return Err(HarnessError::Protocol(format!("frame of {} bytes exceeds limit", body.len())));
    }
    w.write_all(&(body.len() as u32).to_be_bytes())?;
    w.write_all(&body)?;
    w.flush()?;
    Ok(())
}

pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(r: &mut R) -> Result<T, HarnessError> {
    let mut len = [0u8; 4];
    r.read_exact(&mut len)?;
    let len = u32::from_be_bytes(len) as usize;
    if len > MAX_FRAME {
        return Err(HarnessError::Protocol(format!("frame of {} bytes exceeds limit", len)));
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    serde_json::from_slice(&body).map_err(|e| HarnessError::Protocol(format!("decode: {}", e)))
}

// ---------------------------------------------------------------------------
// CLIENT
// ---------------------------------------------------------------------------

pub struct RemoteHarness {
    stream: TcpStream,
    peer: String,
}

impl RemoteHarness {
    pub fn connect<A: ToSocketAddrs + std::fmt::Display>(addr: A, hello: Hello) -> Result<Self, HarnessError> {
        let peer = addr.to_string();
        let mut stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        write_frame(&mut stream, &Request::Hello(hello))?;
        match read_frame(&mut stream)? {
            Response::Ready => {
                log::info!("REMOTE EVALUATOR {} READY", peer);
                Ok(Self { stream, peer })
            }
            Response::Failed { reason } => Err(HarnessError::Protocol(reason)),
            other => Err(HarnessError::Protocol(format!("expected Ready, got {:?}", other))),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }
}

impl Harness for RemoteHarness {
    fn run(&mut self, config: &EnemyConfiguration, iterations: usize) -> Result<SampleBatch, HarnessError> {
        write_frame(&mut self.stream, &Request::Evaluate {
            configuration: config.clone(),
            iterations,
        })?;
        match read_frame(&mut self.stream)? {
            Response::Batch(batch) => Ok(batch),
            Response::Failed { reason } => Err(HarnessError::Protocol(reason)),
            Response::Ready => Err(HarnessError::Protocol("unexpected Ready".to_string())),
        }
    }
}

impl Drop for RemoteHarness {
    fn drop(&mut self) {
        let _ = write_frame(&mut self.stream, &Request::Finished);
    }
}

// ---------------------------------------------------------------------------
// SERVER
// ---------------------------------------------------------------------------

// ONE SESSION: HANDSHAKE, THEN EVALUATE UNTIL Finished OR EOF.
// RETURNS THE NUMBER OF EVALUATIONS SERVED.
pub fn handle_session<S, F, H>(stream: &mut S, make: F) -> Result<usize, HarnessError>
where
    S: Read + Write,
    F: FnOnce(&Hello) -> Result<H, HarnessError>,
    H: Harness,
{
    let hello = match read_frame(stream)? {
        Request::Hello(h) => h,
        other => {
            let reason = format!("expected Hello, got {:?}", other);
            write_frame(stream, &Response::Failed { reason: reason.clone() })?;
            return Err(HarnessError::Protocol(reason));
        }
    };
    log::info!("SESSION: SUT {} (MAX {:.0}C)", hello.sut, hello.max_temperature);

    let mut harness = match make(&hello) {
        Ok(h) => h,
        Err(e) => {
            write_frame(stream, &Response::Failed { reason: e.to_string() })?;
            return Err(e);
        }
    };
    write_frame(stream, &Response::Ready)?;

    let mut served = 0;
    loop {
        let request = match read_frame(stream) {
            Ok(r) => r,
            Err(HarnessError::Io(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        match request {
            Request::Evaluate { configuration, iterations } => {
                log::debug!("EVALUATE {} x{}", configuration, iterations);
                let response = match harness.run(&configuration, iterations) {
                    Ok(batch) => Response::Batch(batch),
                    Err(HarnessError::Interrupted) => {
                        write_frame(stream, &Response::Failed { reason: "interrupted".to_string() })?;
                        return Err(HarnessError::Interrupted);
                    }
                    Err(e) => {
                        log::warn!("EVALUATION FAILED: {}", e);
                        Response::Failed { reason: e.to_string() }
                    }
                };
                write_frame(stream, &response)?;
                served += 1;
            }
            Request::Finished => break,
            Request::Hello(_) => {
                write_frame(stream, &Response::Failed { reason: "duplicate Hello".to_string() })?;
            }
        }
    }
    log::info!("SESSION CLOSED AFTER {} EVALUATIONS", served);
    Ok(served)
}

// ACCEPT ONE CONNECTION AT A TIME UNTIL `shutdown` IS SET
pub fn serve<F, H>(listener: TcpListener, mut make: F, shutdown: &AtomicBool) -> Result<usize, HarnessError>
where
    F: FnMut(&Hello) -> Result<H, HarnessError>,
    H: Harness,
{
    listener.set_nonblocking(true)?;
    let mut sessions = 0;
    while !shutdown.load(Ordering::Relaxed) {
        let (mut stream, peer) = match listener.accept() {
            Ok(conn) => conn,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        stream.set_nonblocking(false)?;
        log::info!("CONNECTION FROM {}", peer);
        sessions += 1;
        match handle_session(&mut stream, &mut make) {
            Ok(_) => {}
            Err(HarnessError::Interrupted) => break,
            Err(e) => log::warn!("SESSION WITH {} ENDED: {}", peer, e),
        }
    }
    Ok(sessions)
}
