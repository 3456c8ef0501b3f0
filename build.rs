fn main() {
    #[cfg(not(any(feature = "bincode", feature = "messagepack")))]
    compile_error!("sesh requires either the 'bincode' or the 'messagepack' feature to be enabled");

    #[cfg(all(feature = "bincode", feature = "messagepack"))]
    compile_error!("Cannot enable both 'bincode' and 'messagepack' features simultaneously");
}
