//! XMLTV record model, streaming parser, writer and content optimizer

pub mod optimizer;
pub mod parser;
pub mod records;
pub mod writer;

pub use optimizer::{ContentOptimizer, OptimizerConfig};
pub use parser::RecordReader;
pub use records::{
    ChannelRecord, ProgrammeRecord, RecordKind, XmlElement, XmlNode, XmltvRecord, normalize_id,
};
pub use writer::XmltvWriter;
