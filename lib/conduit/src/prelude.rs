pub use crate::bits::{BitField, Constant};
pub use crate::buffer::BlockingListBuffer;
pub use crate::bytes::ByteBuffer;
pub use crate::channel::base::{Channel, ChannelBase, Completion, FailureSink, SuccessSink};
pub use crate::channel::diagram::{BasicDiagram, StateDiagram, Verdict};
pub use crate::channel::machine::{AtomicMachine, BlockingMachine, StateMachine, Transition};
pub use crate::channel::pool::{ChannelKey, ChannelPool, PoolClosed, PoolResult, CHANNEL_NONE};
pub use crate::channel::support::{ChannelError, ChannelResult};
pub use crate::channel::{flags, states, Flags, Guarantee, Op, OpResult, State};
pub use crate::port::{ComPort, Parity, PortOptions, SerialPort};
