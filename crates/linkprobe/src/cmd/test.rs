use std::path::Path;

use linkprobe_peer::{Client, ComplianceHarness, ComplianceReport};
use linkprobe_transport::UnixDomainSocket;

use crate::cmd::{write_report_file, TestArgs};
use crate::exit::{peer_error, transport_error, CliResult, SCENARIO_FAILED, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: TestArgs, format: OutputFormat) -> CliResult<i32> {
    let client_config = args.harness.client_config()?;
    let harness = ComplianceHarness::new(args.harness.harness_config()?);

    let stream = UnixDomainSocket::connect(&args.path)
        .map_err(|err| transport_error("connect failed", err))?;
    let mut client =
        Client::connect(stream, client_config).map_err(|err| peer_error("link setup failed", err))?;

    let report = harness.run(&mut client);
    finish(&report, args.harness.out.as_deref(), format)
}

/// Save and print the report; exit status reflects the verdict.
pub(crate) fn finish(
    report: &ComplianceReport,
    out: Option<&Path>,
    format: OutputFormat,
) -> CliResult<i32> {
    if let Some(path) = out {
        let json = report
            .to_json_pretty()
            .map_err(|err| peer_error("report serialization failed", err))?;
        write_report_file(path, &json)?;
    }
    print_report(report, format);
    Ok(if report.ok { SUCCESS } else { SCENARIO_FAILED })
}
