pub mod document;
pub mod index;
pub mod keystore;
pub mod output;
pub mod protocol;
pub mod secure; // passphrase acquisition
