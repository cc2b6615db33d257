use std::process::ExitCode;

fn main() -> ExitCode {
    match stowaway_shim::run_shim() {
        Ok(code) => ExitCode::from(stowaway_shim::exit_status_byte(code)),
        Err(err) => {
            eprintln!("stowaway: {err:#}");
            ExitCode::from(stowaway_shim::exit_status_byte(
                stowaway_shim::exit_code_for(&err),
            ))
        }
    }
}
