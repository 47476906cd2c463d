//! Request executor
//!
//! Walks testsets, endpoints and combinations in spec order and sends one
//! request at a time. The first error aborts the run; the metadata gathered
//! until then is committed either way, so an aborted run stays on disk as a
//! valid but incomplete run.

use floot_common::{
    request_id, Combination, Endpoint, HookContext, HookStage, HttpMethod, Result, ResultExt,
    RunStorage, Spec, Storages, TestSet, Variables,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::template::{interpolate, interpolate_path, interpolate_pairs};
use crate::transport::{PreparedRequest, Transport};

/// One executed request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSummary {
    pub request_id: String,
    /// Interpolated parameters, as recorded in the metadata
    pub parameters: Combination,
    pub status: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSummary {
    pub testset: String,
    pub endpoint: String,
    pub method: HttpMethod,
    pub requests: Vec<RequestSummary>,
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: String,
    pub endpoints: Vec<EndpointSummary>,
    /// Run variables after the last hook
    pub variables: Variables,
}

impl RunSummary {
    pub fn request_count(&self) -> usize {
        self.endpoints.iter().map(|e| e.requests.len()).sum()
    }
}

pub struct Executor<'a> {
    spec: &'a Spec,
    transport: &'a dyn Transport,
    storage: RunStorage,
    variables: Variables,
}

impl<'a> Executor<'a> {
    /// Validate the spec and create a run with a fresh id
    pub fn create(spec: &'a Spec, storages: &Storages, transport: &'a dyn Transport) -> Result<Self> {
        Self::with_run_id(spec, storages, transport, &Uuid::new_v4().to_string())
    }

    /// Validate the spec and create the run `run_id`. Nothing is created
    /// when validation fails.
    pub fn with_run_id(
        spec: &'a Spec,
        storages: &Storages,
        transport: &'a dyn Transport,
        run_id: &str,
    ) -> Result<Self> {
        spec.validate()?;
        let storage = storages.create_run(run_id)?;
        Ok(Self {
            spec,
            transport,
            storage,
            variables: Variables::new(),
        })
    }

    pub fn run_id(&self) -> &str {
        self.storage.name()
    }

    /// Execute every testset, then commit the metadata tree
    pub async fn run(mut self) -> Result<RunSummary> {
        let result = self.execute().await;
        let committed = self.storage.commit();

        match result {
            Ok(summary) => {
                committed?;
                info!(
                    run_id = %summary.run_id,
                    requests = summary.request_count(),
                    "run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(commit_error) = committed {
                    error!(run_id = %self.run_id(), "failed to commit aborted run: {}", commit_error);
                }
                error!(run_id = %self.run_id(), "run aborted: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<RunSummary> {
        let spec = self.spec;
        let mut endpoints = Vec::new();

        self.hook(HookContext::new(HookStage::BeforeAll), None, None)?;
        for (name, testset) in spec.testsets.iter() {
            let summaries = self.testset(name, testset).await.breadcrumb(|| name)?;
            endpoints.extend(summaries);
        }
        self.hook(HookContext::new(HookStage::AfterAll), None, None)?;

        Ok(RunSummary {
            run_id: self.run_id().to_string(),
            endpoints,
            variables: self.variables.clone(),
        })
    }

    async fn testset(&mut self, name: &str, testset: &TestSet) -> Result<Vec<EndpointSummary>> {
        let spec = self.spec;
        let mut summaries = Vec::new();

        self.hook(
            HookContext::new(HookStage::BeforeTestset).testset(name),
            Some(testset),
            None,
        )?;
        let endpoints = spec.endpoints_for(testset);
        for (endpoint_name, endpoint) in endpoints.iter() {
            let requests = self
                .endpoint(name, testset, endpoint_name, endpoint)
                .await
                .breadcrumb(|| format!("{} > {}", name, endpoint_name))?;
            summaries.push(EndpointSummary {
                testset: name.to_string(),
                endpoint: endpoint_name.to_string(),
                method: endpoint.method,
                requests,
            });
        }
        self.hook(
            HookContext::new(HookStage::AfterTestset).testset(name),
            Some(testset),
            None,
        )?;

        Ok(summaries)
    }

    async fn endpoint(
        &mut self,
        testset_name: &str,
        testset: &TestSet,
        name: &str,
        endpoint: &Endpoint,
    ) -> Result<Vec<RequestSummary>> {
        let spec = self.spec;
        let parameters = spec.used_parameters(testset, endpoint)?;
        let strategy = spec.strategy(&endpoint.strategy.name)?;

        self.hook(
            HookContext::new(HookStage::BeforeEndpoint)
                .testset(testset_name)
                .endpoint(name),
            Some(testset),
            Some(endpoint),
        )?;

        let combinations = strategy.generate(
            testset_name,
            name,
            &self.variables,
            &endpoint.strategy.args,
            &parameters,
        )?;
        info!(
            testset = testset_name,
            endpoint = name,
            method = %endpoint.method,
            requests = combinations.len(),
            "executing endpoint"
        );

        let mut requests = Vec::with_capacity(combinations.len());
        for combination in &combinations {
            let id = request_id(testset_name, name, combination);
            let summary = self
                .request(testset_name, testset, name, endpoint, combination, &id)
                .await
                .breadcrumb(|| format!("{} > {} > {}", testset_name, name, id))?;
            requests.push(summary);
        }

        self.hook(
            HookContext::new(HookStage::AfterEndpoint)
                .testset(testset_name)
                .endpoint(name),
            Some(testset),
            Some(endpoint),
        )?;
        Ok(requests)
    }

    async fn request(
        &mut self,
        testset_name: &str,
        testset: &TestSet,
        name: &str,
        endpoint: &Endpoint,
        combination: &Combination,
        id: &str,
    ) -> Result<RequestSummary> {
        let spec = self.spec;
        let ctx = |stage| {
            HookContext::new(stage)
                .testset(testset_name)
                .endpoint(name)
                .combination(combination)
        };

        self.hook(ctx(HookStage::BeforeRequest), Some(testset), Some(endpoint))?;

        let transformer = endpoint
            .transformer
            .as_deref()
            .map(|t| spec.transformer(t))
            .transpose()?;

        let parameters = interpolate_pairs(combination, &self.variables);
        let mut prepared = PreparedRequest::new(
            endpoint.method,
            &spec.host,
            &interpolate_path(name, &self.variables),
        );
        prepared.query = parameters.clone();
        prepared.headers = spec
            .request
            .header
            .iter()
            .map(|(header, value)| (header.to_string(), interpolate(value, &self.variables)))
            .collect();

        let response = self.transport.send(&prepared).await?;
        let response = match transformer {
            Some(transformer) => transformer.transform(testset_name, name, response)?,
            None => response,
        };
        debug!(request_id = id, status = response.status, "storing response");

        self.storage.save_blob(id, &response)?;
        self.storage
            .metadata_mut()
            .record(testset_name, name, id, parameters.clone());

        self.hook(ctx(HookStage::AfterRequest), Some(testset), Some(endpoint))?;

        Ok(RequestSummary {
            request_id: id.to_string(),
            parameters,
            status: response.status,
        })
    }

    fn hook(
        &mut self,
        ctx: HookContext<'_>,
        testset: Option<&TestSet>,
        endpoint: Option<&Endpoint>,
    ) -> Result<()> {
        let spec = self.spec;
        if let Some(hook) = spec.hook(ctx.stage, testset, endpoint) {
            debug!(stage = %ctx.stage, "calling hook");
            hook.call(&ctx, &mut self.variables)?;
        }
        Ok(())
    }
}
