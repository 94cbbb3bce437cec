/*!
 * End-to-end selection flows against the sample catalog
 *
 * Drives [`SearchSession`] through the in-memory backend the way a search
 * page would: insurance chain, drug search, NDC choice and pricing.
 */

use std::time::Duration;

use rxlookup::lookup::LookupStatus;
use rxlookup::mock::InjectedFailure;
use rxlookup::prelude::*;
use rxlookup::schema::endpoints;
use tokio::time::Instant;

fn session() -> SearchSession<MockPricingApi> {
    SearchSession::new(MockPricingApi::sample(), &RxConfig::default())
}

fn session_with_page_size(page_size: usize) -> SearchSession<MockPricingApi> {
    let config = ConfigBuilder::new().page_size(page_size).build();
    SearchSession::new(MockPricingApi::sample(), &config)
}

async fn select_bin_named(session: &mut SearchSession<MockPricingApi>, text: &str) {
    session.search_bins(text).await;
    let bin = session.chain().bin_search().suggestions()[0].clone();
    assert_eq!(session.select_bin(bin).await, Completion::Applied);
}

async fn select_caremark_std(session: &mut SearchSession<MockPricingApi>) {
    select_bin_named(session, "610591").await;
    let pcn = session.chain().pcns().items().iter().find(|p| p.code == "CMK").cloned().unwrap();
    assert_eq!(session.select_pcn(pcn).await.unwrap(), Completion::Applied);
    let group = session.chain().rx_groups().items().iter().find(|g| g.name == "CMK-STD").cloned().unwrap();
    session.select_rx_group(group).unwrap();
}

#[tokio::test]
async fn test_caremark_walk_prices_first_ndc() {
    let mut session = session();
    select_caremark_std(&mut session).await;
    assert_eq!(session.chain().insurance_scope(), Some(InsuranceScope::RxGroup(1001)));

    assert_eq!(session.search_drugs("Atorvastatin").await, Some(Completion::Applied));
    let suggestions = session.chain().drug_search().suggestions().to_vec();
    assert_eq!(suggestions.len(), 1, "one suggestion per drug name");
    assert_eq!(session.chain().drug_search().results().len(), 4);

    let quote = session.select_drug(suggestions[0].clone()).await.unwrap();
    let options: Vec<&str> = session.chain().ndc_options().iter().map(|n| n.as_str()).collect();
    assert_eq!(options, vec!["00071015523", "00071015623", "00071015723", "00378395077"]);
    assert_eq!(session.chain().ndc().map(|n| n.as_str()), Some("00071015523"));

    let priced = quote.quote().expect("covered drug is priced");
    assert_eq!(priced.insurance_id, 1001);
    assert!(priced.net_price.is_some());
    assert!(quote.display().starts_with('$'));
}

#[tokio::test]
async fn test_ndc_change_reprices() {
    let mut session = session();
    select_caremark_std(&mut session).await;
    session.search_drugs("atorvastatin").await;
    let drug = session.chain().drug_search().suggestions()[0].clone();
    session.select_drug(drug).await.unwrap();
    let before = session.api().call_count(endpoints::DETAILS);

    let other = Ndc::new("00378-3950-77").unwrap();
    let quote = session.select_ndc(other.clone()).await.unwrap();
    assert_eq!(quote.quote().map(|q| &q.ndc), Some(&other));
    assert_eq!(session.api().call_count(endpoints::DETAILS), before + 1);

    // Selecting the same NDC again does not refetch
    session.select_ndc(other).await.unwrap();
    assert_eq!(session.api().call_count(endpoints::DETAILS), before + 1);

    let foreign = Ndc::new("00093111101").unwrap();
    assert!(matches!(session.select_ndc(foreign).await, Err(RxError::Validation { .. })));
}

#[tokio::test]
async fn test_new_bin_clears_downstream() {
    let mut session = session();
    select_caremark_std(&mut session).await;
    session.search_drugs("lisinopril").await;
    let drug = session.chain().drug_search().suggestions()[0].clone();
    session.select_drug(drug).await.unwrap();
    assert!(session.chain().quote().quote().is_some());

    select_bin_named(&mut session, "Express").await;
    let chain = session.chain();
    assert_eq!(chain.bin().map(|b| b.id), Some(2));
    assert!(chain.pcn().is_none());
    assert!(chain.rx_group().is_none());
    assert!(chain.drug().is_none());
    assert!(chain.ndc().is_none());
    assert!(chain.ndc_options().is_empty());
    assert!(chain.drug_search().suggestions().is_empty());
    assert_eq!(chain.quote(), &QuoteState::Inactive);
    assert_eq!(chain.pcns().items().len(), 1);
}

#[tokio::test]
async fn test_limit_toggle_resets_and_requires_scope() {
    let mut session = session();
    select_caremark_std(&mut session).await;
    session.search_drugs("metformin").await;
    assert!(session.chain().has_state(Stage::Drug));

    session.set_limit_to_insurance(true);
    for stage in Stage::ALL {
        assert!(!session.chain().has_state(stage), "{} survived the toggle", stage);
    }

    // No insurance selected: the drug stage is disabled and nothing is sent
    let calls = session.api().total_calls();
    assert!(!session.chain().is_enabled(Stage::Drug));
    assert!(session.search_drugs("metformin").await.is_none());
    assert!(session.search_drug_classes("statin").await.is_none());
    assert_eq!(session.api().total_calls(), calls);

    // Toggling to the same value is not a change
    select_bin_named(&mut session, "Caremark").await;
    session.set_limit_to_insurance(true);
    assert!(session.chain().bin().is_some());
}

#[tokio::test]
async fn test_scoped_search_uses_most_specific_selection() {
    let mut session = session();
    session.set_limit_to_insurance(true);

    select_bin_named(&mut session, "OptumRx").await;
    assert_eq!(session.search_drugs("i").await, Some(Completion::Applied));
    assert_eq!(session.api().call_count(endpoints::DRUGS_BY_BIN), 1);
    let names: Vec<&str> = session.chain().drug_search().suggestions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Enalapril", "Lisinopril"], "OptumRx covers ACE inhibitors only");

    let pcn = session.chain().pcns().items()[0].clone();
    session.select_pcn(pcn).await.unwrap();
    session.search_drugs("pril").await;
    assert_eq!(session.api().call_count(endpoints::DRUGS_BY_PCN), 1);

    let group = session.chain().rx_groups().items()[0].clone();
    session.select_rx_group(group).unwrap();
    session.search_drug_classes("inhibitors").await;
    assert_eq!(session.api().call_count(endpoints::CLASSES_BY_INSURANCE), 1);
    let classes = session.chain().class_search().suggestions();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "ACE Inhibitors");
}

#[tokio::test]
async fn test_class_selection_lists_drugs() {
    let mut session = session();
    select_caremark_std(&mut session).await;
    session.search_drug_classes("biguanides").await;
    let class = session.chain().class_search().suggestions()[0].clone();
    assert_eq!(session.select_drug_class(class).await.unwrap(), Completion::Applied);

    let drugs = session.chain().class_drugs().items().to_vec();
    assert_eq!(drugs.len(), 2);
    let quote = session.select_drug(drugs[1].clone()).await.unwrap();
    assert_eq!(session.chain().ndc_options().len(), 2);
    assert_eq!(session.chain().ndc(), Some(&drugs[0].ndc));
    assert!(quote.quote().is_some());
}

#[tokio::test]
async fn test_uninsured_rows_only_in_uninsured_table() {
    let mut session = session();
    select_caremark_std(&mut session).await;
    session.search_drugs("atorvastatin").await;
    let drug = session.chain().drug_search().suggestions()[0].clone();
    session.select_drug(drug).await.unwrap();

    let view = session.alternatives().await.unwrap();
    assert!(!view.insured.is_empty());
    assert!(!view.uninsured.is_empty());
    assert!(view.insured.iter().all(|row| row.coverage.is_insured()));
    assert!(view.uninsured.iter().all(|row| row.coverage == Coverage::Uninsured));
    // Statins are on Caremark and Express Scripts formularies
    assert_eq!(view.insured.len(), 2 * view.uninsured.len());
}

#[tokio::test]
async fn test_rx_group_failure_keeps_pcn() {
    let mut session = session();
    session.api().fail_endpoint(endpoints::RX_GROUPS_BY_PCN, InjectedFailure::Transport);
    select_bin_named(&mut session, "610591").await;
    let pcn = session.chain().pcns().items()[0].clone();

    assert_eq!(session.select_pcn(pcn.clone()).await.unwrap(), Completion::Failed);
    assert_eq!(session.chain().pcn(), Some(&pcn));
    assert!(session.chain().rx_groups().items().is_empty());
    assert!(matches!(session.chain().rx_groups().status(), LookupStatus::Failed(_)));

    // The PCN still scopes drug searches
    assert_eq!(session.chain().insurance_scope(), Some(InsuranceScope::Pcn(pcn.id)));
}

#[tokio::test]
async fn test_failed_query_keeps_previous_suggestions() {
    let mut session = session();
    session.search_drugs("simva").await;
    assert_eq!(session.chain().drug_search().suggestions().len(), 1);

    session.api().fail_endpoint(endpoints::DRUGS_BY_NAME, InjectedFailure::Status(500));
    assert_eq!(session.search_drugs("metf").await, Some(Completion::Failed));
    let lookup = session.chain().drug_search();
    assert_eq!(lookup.suggestions()[0].name, "Simvastatin");
    assert!(matches!(lookup.status(), LookupStatus::Failed(_)));
}

#[tokio::test]
async fn test_access_blocked_is_reported() {
    let mut session = session();
    session.api().fail_endpoint(endpoints::DRUGS_BY_NAME, InjectedFailure::Status(403));
    session.search_drugs("lisinopril").await;
    assert!(matches!(session.chain().drug_search().status(), LookupStatus::AccessBlocked(_)));

    session.api().clear_failures();
    select_caremark_std(&mut session).await;
    session.search_drugs("lisinopril").await;
    let drug = session.chain().drug_search().suggestions()[0].clone();

    session.api().fail_endpoint(endpoints::DETAILS, InjectedFailure::Status(401));
    let quote = session.select_drug(drug).await.unwrap();
    assert_eq!(quote, QuoteState::Unavailable(UnavailableReason::AccessBlocked));
    assert_eq!(quote.display(), "Unavailable (public access blocked)");
}

#[tokio::test]
async fn test_pages_extend_the_result_prefix() {
    let mut session = session_with_page_size(3);
    session.search_drugs("statin").await;
    let first_page: Vec<Ndc> = session.chain().drug_search().results().iter().map(|d| d.ndc.clone()).collect();
    assert_eq!(first_page.len(), 3);

    assert_eq!(session.load_more_drugs().await, Some(Completion::Applied));
    assert_eq!(session.load_more_drugs().await, Some(Completion::Applied));
    let all: Vec<Ndc> = session.chain().drug_search().results().iter().map(|d| d.ndc.clone()).collect();
    assert_eq!(all.len(), 7);
    assert_eq!(&all[..3], &first_page[..]);

    // The third page was short, so there is nothing more to ask for
    assert!(!session.chain().drug_search().has_more());
    assert!(session.load_more_drugs().await.is_none());

    let names: Vec<&str> = session.chain().drug_search().suggestions().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["Atorvastatin", "Rosuvastatin", "Simvastatin"]);
}

#[tokio::test]
async fn test_out_of_order_responses_keep_latest_query() {
    let api = MockPricingApi::sample();
    let mut chain = SelectionChain::new(20);

    let older = chain.begin_drug_search("atorva").unwrap();
    let newer = chain.begin_drug_search("metformin").unwrap();
    let older_result = api.search_drugs(&older.request).await;
    let newer_result = api.search_drugs(&newer.request).await;

    assert_eq!(chain.complete_drug_search(&newer, newer_result), Completion::Applied);
    assert_eq!(chain.complete_drug_search(&older, older_result), Completion::Stale);
    assert_eq!(chain.drug_search().suggestions()[0].name, "Metformin");
}

#[tokio::test]
async fn test_debounced_input_issues_one_lookup() {
    let mut session = session();
    let mut debouncer = Debouncer::new(Duration::from_millis(300));
    let start = Instant::now();

    for (offset, text) in [(0, "l"), (80, "li"), (160, "lis"), (240, "lisi")] {
        let settled = debouncer.input(text, start + Duration::from_millis(offset));
        assert!(session.apply_drug_input(settled).await.is_none());
    }
    assert!(session.apply_drug_input(debouncer.poll(start + Duration::from_millis(400))).await.is_none());

    let settled = debouncer.poll(start + Duration::from_millis(560));
    assert_eq!(settled, Settled::Query("lisi".to_string()));
    assert_eq!(session.apply_drug_input(settled).await, Some(Completion::Applied));
    assert_eq!(session.api().call_count(endpoints::DRUGS_BY_NAME), 1);

    assert!(session.apply_drug_input(debouncer.input("  ", start + Duration::from_millis(600))).await.is_none());
    assert!(session.chain().drug_search().suggestions().is_empty());
}

#[tokio::test]
async fn test_same_text_requeried_after_scope_change() {
    let mut session = session();
    let mut debouncer = Debouncer::new(Duration::from_millis(300));
    let start = Instant::now();

    debouncer.input("lisinopril", start);
    let settled = debouncer.poll(start + Duration::from_millis(300));
    assert_eq!(session.apply_drug_input(settled).await, Some(Completion::Applied));
    assert_eq!(session.api().call_count(endpoints::DRUGS_BY_NAME), 1);

    session.set_limit_to_insurance(true);
    select_bin_named(&mut session, "610014").await;
    assert!(session.chain().drug_search().suggestions().is_empty());

    debouncer.input("lisinopril", start + Duration::from_millis(1000));
    let settled = debouncer.poll(start + Duration::from_millis(1300));
    assert_eq!(settled, Settled::Query("lisinopril".to_string()));
    assert_eq!(session.apply_drug_input(settled).await, Some(Completion::Applied));
    assert_eq!(session.api().call_count(endpoints::DRUGS_BY_BIN), 1);
    assert_eq!(session.chain().drug_search().suggestions()[0].name, "Lisinopril");
}

#[tokio::test]
async fn test_same_text_retried_after_failure() {
    let mut session = session();
    let mut debouncer = Debouncer::new(Duration::from_millis(300));
    let start = Instant::now();

    session.api().fail_endpoint(endpoints::DRUGS_BY_NAME, InjectedFailure::Transport);
    debouncer.input("metformin", start);
    let settled = debouncer.poll(start + Duration::from_millis(300));
    assert_eq!(session.apply_drug_input(settled).await, Some(Completion::Failed));
    assert!(matches!(session.chain().drug_search().status(), LookupStatus::Failed(_)));

    session.api().clear_failures();
    debouncer.input("metformin", start + Duration::from_millis(500));
    let settled = debouncer.poll(start + Duration::from_millis(800));
    assert_eq!(session.apply_drug_input(settled).await, Some(Completion::Applied));
    assert_eq!(session.chain().drug_search().suggestions()[0].name, "Metformin");
    assert_eq!(session.chain().drug_search().status(), &LookupStatus::Loaded);
}

#[tokio::test]
async fn test_drug_packages_beyond_loaded_pages() {
    let mut session = session_with_page_size(3);
    assert_eq!(session.search_drugs("statin").await, Some(Completion::Applied));
    assert_eq!(session.chain().drug_search().results().len(), 3);
    assert!(session.chain().drug_search().has_more());

    let atorvastatin = session.chain().drug_search().suggestions()[0].clone();
    assert_eq!(atorvastatin.name, "Atorvastatin");
    session.select_drug(atorvastatin).await.unwrap();

    let expected: Vec<Ndc> = session
        .api()
        .catalog()
        .drugs_matching("Atorvastatin", None)
        .into_iter()
        .map(|d| d.ndc)
        .collect();
    assert_eq!(expected.len(), 4);
    assert_eq!(session.chain().ndc_options(), expected.as_slice());
    assert_eq!(session.chain().ndc(), Some(&expected[0]));

    // The suggestion list keeps its own pages
    assert_eq!(session.chain().drug_search().results().len(), 3);
    let last = expected[3].clone();
    assert!(session.select_ndc(last).await.is_ok());
}
