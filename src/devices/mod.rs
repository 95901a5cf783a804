
// Siglent SDS2000X-family oscilloscopes (binary :WAVeform:PREamble? and paged :WAVeform:DATA?)
pub mod sds2000x;
