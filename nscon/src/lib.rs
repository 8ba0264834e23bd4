//! An implementation of the sub-command protocol spoken by Nintendo Switch
//! controllers (Joy-Cons and the Pro Controller).
//!
//! The controllers expose a single vendor HID interface. On top of plain
//! input reports they multiplex an application-level request/response
//! protocol: requests go out as *sub-commands* embedded in output report
//! `0x01`, and the firmware answers on input report `0x21`, echoing the
//! sub-command opcode. There is no request id — replies are correlated purely
//! by content, which is why this crate serializes requests per controller.
//!
//! On top of the sub-command layer sit an addressed accessor for the
//! controller's SPI flash memory (where the persistent device colors live)
//! and a session type that fetches controller identity and lets a host
//! application read and rewrite the color scheme.
//!
//! Much of the protocol knowledge encoded here stems from the community
//! reverse engineering effort around [dekuNukem's notes](https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering).
//!
//! # Quickstart
//!
//! ## Establish HID communication
//!
//! This crate implements the controller protocol, not the underlying HID
//! communication, which is left to an external crate of your choice. The
//! trait used for bridging your HID implementation to this crate is
//! [`channel::RawHidTransport`], so make sure to provide an implementation
//! for it. The trait defines async methods using [`mod@async_trait`], which
//! is re-exported for annotating your implementing type.
//!
//! ## Talk to a controller
//!
//! ```no_run
//! # async fn doc(my_hid_transport: impl nscon::channel::RawHidTransport) {
//! use nscon::controller::Controller;
//!
//! // Opens the report channel, runs the connection handshake and fetches
//! // identity, color and battery data in one go.
//! let mut controller = Controller::connect(my_hid_transport)
//!     .await
//!     .expect("could not establish a controller session");
//!
//! println!(
//!     "{} ({}), firmware {}, battery {:.2} V",
//!     controller.product_name(),
//!     controller.kind(),
//!     controller.firmware(),
//!     controller.voltage(),
//! );
//!
//! // Color edits are local until they are submitted.
//! controller.colors_mut().body = "#1edc00".parse().unwrap();
//! controller
//!     .submit_color()
//!     .await
//!     .expect("could not write the new colors");
//! # }
//! ```

pub use async_trait::async_trait;

pub mod channel;
pub mod color;
pub mod controller;
pub mod flash;
pub mod hex;
pub mod subcommand;
