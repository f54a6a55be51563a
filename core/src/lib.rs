pub mod channel;

// Protocol codecs built on the channel framework
pub mod bpa_pdcstream;
pub mod fnet;
pub mod ieee_1344;
pub mod ieee_c37_118;

pub mod utils;
