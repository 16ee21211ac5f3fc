use crate::bytes::ByteBuffer;
use crate::channel::base::{Channel, ChannelBase};
use crate::channel::diagram::BasicDiagram;
use crate::channel::machine::{StateMachine, Transition};
use crate::channel::support::{ChannelError, ChannelResult};
use crate::channel::{Flags, Op};
use ballast::choose;
use ballast::logging;
use serde_derive::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Line configuration handed to the device on open.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct PortOptions {
    pub name: String,
    pub baud_rate: u32,
    pub byte_size: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl PortOptions {
    /// Options for the common 4800-8-O-1 line.
    #[inline]
    pub fn new(name: &str) -> PortOptions {
        PortOptions {
            name: name.to_string(),
            baud_rate: 4800,
            byte_size: 8,
            parity: Parity::Odd,
            stop_bits: 1,
        }
    }
}

/// The underlying serial device: a movable, non-copyable handle with
/// plain boolean outcomes. The engine never interprets device errors
/// beyond success and failure; a device is expected to leave itself
/// closed after a failed read or write.
pub trait SerialPort: Send {
    fn is_open(&self) -> bool;

    fn open(&mut self, options: &PortOptions) -> bool;

    fn close(&mut self) -> bool;

    /// Reads into the buffer's active window, advancing its position.
    fn read(&mut self, dst: &mut ByteBuffer) -> bool;

    /// Writes out of the buffer's active window, advancing its position.
    fn write(&mut self, src: &mut ByteBuffer) -> bool;
}

/// A COM-port channel: device I/O bracketed by the lifecycle engine.
/// The device sits behind a mutex, so a read and a write admitted
/// concurrently by the engine serialize at the device boundary.
pub struct ComPort<P: SerialPort> {
    base: ChannelBase,
    port: Mutex<P>,
    options: PortOptions,
    log: logging::Logger,
}

impl<P: SerialPort> ComPort<P> {
    /// Builds the channel around the supplied device and machine. The
    /// declared flags are installed on the machine before anything else
    /// can touch it.
    #[inline]
    pub fn new<'a, L: Into<Option<&'a logging::Logger>>>(
        port: P,
        options: PortOptions,
        machine: Box<dyn StateMachine>,
        flags: Flags,
        log: L,
    ) -> ComPort<P> {
        machine.set_flags(flags);

        let port_log = match log.into() {
            Some(log) => log.new(logging::o!()),
            _ => logging::Logger::root(logging::Discard, logging::o!()),
        };

        ComPort {
            base: ChannelBase::new(Box::new(BasicDiagram), machine),
            port: Mutex::new(port),
            options,
            log: port_log,
        }
    }

    #[inline]
    pub fn options(&self) -> &PortOptions {
        &self.options
    }

    #[inline]
    fn device(&self) -> MutexGuard<P> {
        self.port.lock().expect("Serial port mutex poisoned")
    }
}

impl<P: SerialPort> Channel for ComPort<P> {
    #[inline]
    fn base(&self) -> &ChannelBase {
        &self.base
    }

    fn open(&self) -> ChannelResult<Transition> {
        logging::trace!(self.log, "opening port";
                        "context" => "open",
                        "port" => %self.options.name);

        let result = self.base.do_as(Op::Open, || {
            choose!(self.device().open(&self.options) => Ok(()),
                    Err(ChannelError::Channel(format!(
                        "cannot open port [{}]",
                        self.options.name
                    ))))
        });

        logging::debug!(self.log, "open finished";
                        "context" => "open",
                        "port" => %self.options.name,
                        "result" => ?result);

        result
    }

    fn close(&self) -> ChannelResult<Transition> {
        logging::trace!(self.log, "closing port";
                        "context" => "close",
                        "port" => %self.options.name);

        let result = self.base.do_as(Op::Close, || {
            choose!(self.device().close() => Ok(()),
                    Err(ChannelError::Channel(format!(
                        "cannot close port [{}]",
                        self.options.name
                    ))))
        });

        logging::debug!(self.log, "close finished";
                        "context" => "close",
                        "port" => %self.options.name,
                        "result" => ?result);

        result
    }

    fn read(&self, dst: &mut ByteBuffer) -> ChannelResult<Transition> {
        logging::trace!(self.log, "reading from port";
                        "context" => "read",
                        "port" => %self.options.name,
                        "free" => dst.remaining());

        self.base.do_as(Op::Read, || {
            choose!(self.device().read(dst) => Ok(()),
                    Err(ChannelError::Channel(format!(
                        "error while reading port [{}]",
                        self.options.name
                    ))))
        })
    }

    fn write(&self, src: &mut ByteBuffer) -> ChannelResult<Transition> {
        logging::trace!(self.log, "writing to port";
                        "context" => "write",
                        "port" => %self.options.name,
                        "pending" => src.remaining());

        self.base.do_as(Op::Write, || {
            choose!(self.device().write(src) => Ok(()),
                    Err(ChannelError::Channel(format!(
                        "error while writing port [{}]",
                        self.options.name
                    ))))
        })
    }
}
