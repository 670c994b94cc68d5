//! Election-level protocols built on top of ElGamal encryption and proofs: ballot encoding,
//! section decoding, per-election key management and ballot validation.

mod ballot;
mod decode;
mod pipeline;
mod registry;

pub use self::{
    ballot::{
        row_choices, section_options, verify_row, AuditSink, AuditableRow, BallotEncoder,
        EncryptedOption, EncryptedRow, EncryptedSection, FilledBallotPaper, OptionId, PlainRow,
        ReservedIdError, RowError,
    },
    decode::{calculate_lookup_table, decrypt_section, DecodeError, DecodedSection, SectionTally},
    pipeline::{
        AcceptedBallot, BallotDirectory, BallotPaperConfig, BallotRejection, BallotTotals,
        ElectionKeys, ElectionStatus, RejectionCause, RejectionKind, SectionConfig, Stage,
        ValidationPipeline, VoterRegistry, VoterStatus,
    },
    registry::{ElectionRegistry, KeyStatus, RegistryError},
};
