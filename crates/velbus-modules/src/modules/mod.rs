pub mod unknown;
pub mod vmb1ts;
pub mod vmb2bl;
pub mod vmb4dc;
pub mod vmb4ryno;
pub mod vmb6in;
pub mod vmbble;
pub mod vmbdali;
pub mod vmbgpod;
